//! TCP relay for newline-delimited JSON envelopes.
//!
//! The server keeps a registry of connected clients, forwards directed
//! messages between them and answers `CLIENTS_LIST` requests. The client
//! side reads envelopes from stdin and prints what the server sends back.

pub mod client;
pub mod config;
pub mod conn;
pub mod error;
pub mod framing;
pub mod ident;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;

pub use error::{Error, Result};
