//! Process-wide engine configuration.
//!
//! Configuration is resolved exactly once, on first access, from environment
//! variables with documented defaults. Later reads observe the same values
//! for the process lifetime; there is no reinitialization path, so every
//! component that captures a config value stays consistent with every other.

use std::env;
use std::sync::OnceLock;

/// Environment variable naming the state serializer (`binary` or `json`).
pub const STATE_SERIALIZER_VAR: &str = "STATE_SERIALIZER";
/// Environment variable toggling circular-reference tolerance (`0` or `1`).
pub const STATE_CIRCULAR_REFS_VAR: &str = "STATE_CIRCULAR_REFS";
/// Environment variable toggling absent-field stripping (`0` or `1`).
pub const STATE_STRIP_ABSENT_VAR: &str = "STATE_STRIP_ABSENT";

/// Resolved state-engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Registry name of the serializer used for sanitization round trips
    /// and state persistence.
    pub serializer: String,
    /// Whether re-encountered composite values are treated as legitimate
    /// shared references rather than failures.
    pub circular_allowed: bool,
    /// Whether absent values are stripped from mappings (and nulled in
    /// sequences) during sanitization.
    pub strip_absent: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            serializer: "binary".to_string(),
            circular_allowed: true,
            strip_absent: true,
        }
    }
}

impl StateConfig {
    /// Reads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            serializer: env::var(STATE_SERIALIZER_VAR).unwrap_or(defaults.serializer),
            circular_allowed: read_flag(STATE_CIRCULAR_REFS_VAR, defaults.circular_allowed),
            strip_absent: read_flag(STATE_STRIP_ABSENT_VAR, defaults.strip_absent),
        }
    }
}

fn read_flag(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(value) => match value.as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

static STATE_CONFIG: OnceLock<StateConfig> = OnceLock::new();

/// Returns the process-wide state configuration, resolving it on first call.
pub fn state_config() -> &'static StateConfig {
    STATE_CONFIG.get_or_init(StateConfig::from_env)
}
