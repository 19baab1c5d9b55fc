//! Chrome debug bridge.
//!
//! Serves the Debug Adapter Protocol on a byte stream and drives a Chrome DevTools
//! Protocol target through [`chrome_debug_adapter::ChromeDebugAdapter`], with the
//! [`adapter_proxy`] transformer chain in between.

pub mod config;
pub mod logging;
pub mod server;

pub use config::{load_config, BridgeConfig, LoadedConfig};
pub use logging::Logging;
pub use server::{serve, ServerError};
