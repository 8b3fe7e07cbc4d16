pub mod app;
pub mod backend;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod ollama;
pub mod registry;
pub mod ui;
pub mod view;
