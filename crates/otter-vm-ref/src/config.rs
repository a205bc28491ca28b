//! Reference subsystem configuration

/// Environment variable enabling per-entry trace events
pub const TRACE_ENV_VAR: &str = "OTTER_REF_TRACE";

/// Default decay budget given to new soft references
pub const DEFAULT_SOFT_TTL: u16 = 10;

/// Reference subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceConfig {
    /// Decay budget of newly created soft references (default: 10)
    pub default_soft_ttl: u16,
    /// Emit a `trace` event for every entry checked before sweep
    pub trace: bool,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            default_soft_ttl: DEFAULT_SOFT_TTL,
            trace: false,
        }
    }
}

impl ReferenceConfig {
    /// Default configuration with `trace` read from `OTTER_REF_TRACE`
    pub fn from_env() -> Self {
        let value = std::env::var(TRACE_ENV_VAR).ok();
        Self {
            trace: parse_trace_level(value.as_deref()),
            ..Self::default()
        }
    }

    /// Override the default soft TTL
    pub fn with_default_soft_ttl(mut self, ttl: u16) -> Self {
        self.default_soft_ttl = ttl;
        self
    }

    /// Enable or disable per-entry tracing
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// A positive integer turns tracing on; anything else leaves it off
fn parse_trace_level(value: Option<&str>) -> bool {
    value
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .is_some_and(|level| level > 0)
}
