use std::time::Duration;

use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};

/// Session tuning knobs. Everything has a default so a config file may omit the section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub cdp: CdpConfig,
    /// Upper bound on the clear-and-add work of one `setBreakpoints` request.
    pub set_breakpoints_timeout_ms: u64,
    /// Banner shown in the page while paused. `None` disables the overlay.
    pub pause_overlay_message: Option<String>,
    /// How long a resume waits before hiding the banner, so quick steps do not flicker.
    pub overlay_clear_delay_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            cdp: CdpConfig::default(),
            set_breakpoints_timeout_ms: 2_000,
            pause_overlay_message: Some("Paused in debugger".to_string()),
            overlay_clear_delay_ms: 200,
        }
    }
}

impl AdapterConfig {
    pub fn set_breakpoints_timeout(&self) -> Duration {
        Duration::from_millis(self.set_breakpoints_timeout_ms)
    }

    pub fn overlay_clear_delay(&self) -> Duration {
        Duration::from_millis(self.overlay_clear_delay_ms)
    }
}
