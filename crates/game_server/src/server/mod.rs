//! TCP hosting: accept loop and per-connection workers.

mod connection;
mod core;

pub use core::GameServer;
