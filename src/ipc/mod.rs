//! IPC module for daemon, UI and speech host communication

mod protocol;
mod server;

pub use server::{Server, ServerContext};
