//! Debug session for Chrome-family targets.
//!
//! [`ChromeDebugAdapter`] implements the [`bridge_core_types::DebugAdapter`] seam on top of
//! a [`cdp_adapter::CdpConnection`]. It owns the script registry, the pause state and its
//! handle tables, and the per-url committed breakpoints. It speaks target coordinates
//! only: zero-based lines, target urls, generated scripts. Client coordinates are the
//! transformer pipeline's business.

pub mod breakpoints;
pub mod config;
pub mod error;
pub mod overlay;
pub mod queue;
pub mod scripts;
pub mod session;
pub mod variables;

pub use breakpoints::{BreakpointManager, BreakpointTarget, CommittedBreakpoint};
pub use config::AdapterConfig;
pub use error::AdapterError;
pub use queue::SerialQueue;
pub use scripts::{is_placeholder, placeholder_url, Script, ScriptRegistry, PLACEHOLDER_SCHEME};
pub use session::{ChromeDebugAdapter, DiagnosticHook, SessionPhase};
pub use variables::{compare_names, PropertySource, VariableContainer};
