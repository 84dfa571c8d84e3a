//! Terminal application: the chat client view-model and its event loop.

pub mod client;
pub mod command;
pub mod runner;
pub mod ui;

pub use client::ChatClient;
pub use command::Command;
pub use runner::run;
