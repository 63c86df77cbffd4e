//! Connection management.
//!
//! [`Connection`] is the shared handle the hub tracks; [`run_connection`]
//! drives the socket behind it.

pub mod client;
pub mod worker;

pub use client::{Connection, EnqueueError, Outbound};
pub use worker::{run_connection, WsStream};
