//! JSON-lines bridge between an editor extension and the controller.
//!
//! The extension spawns `deepchat serve`, writes one view message per line to
//! stdin and reads controller messages, one per line, from stdout.

use crate::channel::{Outbox, ToController, ToView, ViewEndpoint};
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Relays messages until the controller side closes.
///
/// End of input closes the view side of the channel; the controller then
/// stops and the remaining output is flushed before this returns.
pub async fn serve<R, W>(endpoint: ViewEndpoint, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (outbox, mut inbox) = endpoint.split();
    let mut outbox = Some(outbox);
    let mut reader = reader;
    // Partial reads stay here if the other branch wins the select.
    let mut line = Vec::new();

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut line), if outbox.is_some() => {
                if read? == 0 {
                    debug!("bridge input closed");
                    outbox = None;
                } else {
                    if let Some(outbox) = &outbox {
                        forward(outbox, &line);
                    }
                    line.clear();
                }
            }
            message = inbox.recv() => match message {
                Some(message) => write_message(&mut writer, &message).await?,
                None => break,
            },
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Serves the process's own stdin and stdout.
pub async fn serve_stdio(endpoint: ViewEndpoint) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(endpoint, stdin, tokio::io::stdout()).await
}

fn forward(outbox: &Outbox<ToController>, raw: &[u8]) {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!("ignoring input line that is not UTF-8: {}", e);
            return;
        }
    };
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<ToController>(line) {
        Ok(message) => {
            if outbox.post(message).is_err() {
                debug!("controller gone, dropping input");
            }
        }
        Err(e) => warn!("ignoring malformed message {:?}: {}", line, e),
    }
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &ToView) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
