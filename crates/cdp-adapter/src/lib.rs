//! Chrome DevTools Protocol connection layer.
//!
//! The crate owns the single duplex channel to a debug target: it correlates command ids
//! with responses, fans target notifications out to subscribers, and discovers the
//! websocket endpoint of an already running target. Nothing here knows about debugging
//! semantics; the session state machine builds on [`CdpConnection`].

pub mod connection;
pub mod discovery;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod metrics;
pub mod protocol;
pub mod transport;

pub mod error {
    use thiserror::Error;

    /// Failures surfaced by the connection layer.
    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    pub enum CdpError {
        #[error("connection is not open")]
        NotOpen,
        #[error("connection closed")]
        Closed,
        #[error("timed out connecting to {0}")]
        ConnectTimeout(String),
        #[error("transport failure: {0}")]
        Transport(String),
        #[error("command failed ({code}): {message}")]
        Command { code: i64, message: String },
        #[error("target discovery failed: {0}")]
        Discovery(String),
        #[error("malformed payload: {0}")]
        Serde(String),
    }

    impl CdpError {
        pub fn transport(err: impl std::fmt::Display) -> Self {
            CdpError::Transport(err.to_string())
        }

        /// Whether the channel itself is gone, as opposed to one command being rejected.
        pub fn is_connection(&self) -> bool {
            matches!(
                self,
                CdpError::NotOpen
                    | CdpError::Closed
                    | CdpError::ConnectTimeout(_)
                    | CdpError::Transport(_)
            )
        }
    }

    impl From<serde_json::Error> for CdpError {
        fn from(err: serde_json::Error) -> Self {
            CdpError::Serde(err.to_string())
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    /// Connection tuning.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        /// Bound on opening the channel. Individual commands are never timed out.
        pub connect_timeout_ms: u64,
        /// Bound on the `/json/list` discovery request.
        pub discovery_timeout_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                connect_timeout_ms: 10_000,
                discovery_timeout_ms: 5_000,
            }
        }
    }

    impl CdpConfig {
        pub fn connect_timeout(&self) -> Duration {
            Duration::from_millis(self.connect_timeout_ms)
        }

        pub fn discovery_timeout(&self) -> Duration {
            Duration::from_millis(self.discovery_timeout_ms)
        }
    }
}

pub use config::CdpConfig;
pub use connection::{CdpConnection, EventHandler};
pub use discovery::{discover, select_target, TargetDescriptor};
pub use error::CdpError;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryPeer, MemoryTransport, RecordedCommand, ScriptedTarget};
pub use transport::{FrameSink, FrameStream, Transport, WebSocketTransport};
