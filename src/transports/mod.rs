//! Transport implementations for the Chess Arena protocol.
//!
//! Concrete [`Transport`](crate::Transport) / [`Connector`](crate::Connector)
//! implementations live behind feature gates:
//!
//! | Feature                | Types                                              |
//! |------------------------|----------------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`]     |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
