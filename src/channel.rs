//! Messages exchanged between the view and the controller, and the ordered
//! in-process transport that carries them.
//!
//! On the wire each message is a JSON record tagged by `command`:
//!
//! ```json
//! {"command": "chat", "text": "Explain lifetimes"}
//! {"command": "cancel"}
//! {"command": "chatResponse", "text": "Lifetimes are"}
//! ```

use crate::error::ChannelClosed;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Intents sent by the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "text", rename_all = "camelCase")]
pub enum ToController {
    Chat(String),
    Cancel,
    ModelSelected(String),
}

/// State changes sent by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "text", rename_all = "camelCase")]
pub enum ToView {
    /// Cumulative response text so far.
    ChatResponse(String),
    /// Empty on success, otherwise an error to show.
    ResponseEnd(String),
    /// Pre-rendered model list.
    ModelsLoaded(String),
}

/// Sending half of one direction of the channel.
#[derive(Debug)]
pub struct Outbox<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Outbox<T> {
    pub fn post(&self, message: T) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of one direction of the channel.
#[derive(Debug)]
pub struct Inbox<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Inbox<T> {
    /// Next message in delivery order, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// One side of the bidirectional channel.
#[derive(Debug)]
pub struct Endpoint<Out, In> {
    outbox: Outbox<Out>,
    inbox: Inbox<In>,
}

impl<Out, In> Endpoint<Out, In> {
    pub fn post(&self, message: Out) -> Result<(), ChannelClosed> {
        self.outbox.post(message)
    }

    pub async fn recv(&mut self) -> Option<In> {
        self.inbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<In> {
        self.inbox.try_recv()
    }

    pub fn outbox(&self) -> Outbox<Out> {
        self.outbox.clone()
    }

    pub fn split(self) -> (Outbox<Out>, Inbox<In>) {
        (self.outbox, self.inbox)
    }
}

pub type ViewEndpoint = Endpoint<ToController, ToView>;
pub type ControllerEndpoint = Endpoint<ToView, ToController>;

/// Creates a connected pair of endpoints.
pub fn pair() -> (ViewEndpoint, ControllerEndpoint) {
    let (to_controller_tx, to_controller_rx) = mpsc::unbounded_channel();
    let (to_view_tx, to_view_rx) = mpsc::unbounded_channel();

    let view = Endpoint {
        outbox: Outbox {
            tx: to_controller_tx,
        },
        inbox: Inbox { rx: to_view_rx },
    };
    let controller = Endpoint {
        outbox: Outbox { tx: to_view_tx },
        inbox: Inbox {
            rx: to_controller_rx,
        },
    };
    (view, controller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_to_controller() {
        let chat: ToController =
            serde_json::from_value(json!({ "command": "chat", "text": "Hello" })).unwrap();
        assert_eq!(chat, ToController::Chat("Hello".to_string()));

        let cancel: ToController = serde_json::from_value(json!({ "command": "cancel" })).unwrap();
        assert_eq!(cancel, ToController::Cancel);

        let selected: ToController =
            serde_json::from_value(json!({ "command": "modelSelected", "text": "m1" })).unwrap();
        assert_eq!(selected, ToController::ModelSelected("m1".to_string()));

        assert_eq!(
            serde_json::to_value(ToController::Cancel).unwrap(),
            json!({ "command": "cancel" })
        );
    }

    #[test]
    fn test_wire_format_to_view() {
        assert_eq!(
            serde_json::to_value(ToView::ChatResponse("Hi there".to_string())).unwrap(),
            json!({ "command": "chatResponse", "text": "Hi there" })
        );
        assert_eq!(
            serde_json::to_value(ToView::ResponseEnd(String::new())).unwrap(),
            json!({ "command": "responseEnd", "text": "" })
        );
        assert_eq!(
            serde_json::to_value(ToView::ModelsLoaded("<option>m1</option>".to_string()))
                .unwrap(),
            json!({ "command": "modelsLoaded", "text": "<option>m1</option>" })
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result = serde_json::from_value::<ToController>(json!({ "command": "addColor" }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pair_preserves_order_both_ways() {
        let (mut view, mut controller) = pair();

        view.post(ToController::Chat("a".to_string())).unwrap();
        view.post(ToController::Cancel).unwrap();
        assert_eq!(
            controller.recv().await,
            Some(ToController::Chat("a".to_string()))
        );
        assert_eq!(controller.recv().await, Some(ToController::Cancel));

        controller.post(ToView::ChatResponse("x".to_string())).unwrap();
        controller.post(ToView::ResponseEnd(String::new())).unwrap();
        assert_eq!(view.recv().await, Some(ToView::ChatResponse("x".to_string())));
        assert_eq!(view.recv().await, Some(ToView::ResponseEnd(String::new())));
    }

    #[tokio::test]
    async fn test_post_after_peer_dropped() {
        let (view, controller) = pair();
        drop(controller);
        assert_eq!(view.post(ToController::Cancel), Err(ChannelClosed));
    }
}
