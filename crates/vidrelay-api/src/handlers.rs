//! Request handlers.

pub mod chat;
pub mod health;
pub mod webhook;

pub use chat::*;
pub use health::*;
pub use webhook::*;
