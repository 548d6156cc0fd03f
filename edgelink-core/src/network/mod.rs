//! Transport layer: framed connections to a NetApp endpoint.

pub mod connection;

pub use connection::{Connection, ConnectionInfo, ConnectionSender};
