//! Process-wide tunables (spec §5/§6), collected into a struct rather than
//! mutable globals (design note §9-3 applied consistently, not only to the
//! test-mode flag).

/// Default Cast receiver app to probe with `AppAvailable` when the caller
/// does not supply one.
pub const DEFAULT_APP_ID: &str = "02834648";
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 500;
/// Default Cast TLS port (spec §3 "Device record").
pub const DEFAULT_PORT: u16 = 8009;

#[derive(Debug, Clone)]
pub struct Config {
    pub application_id: String,
    pub discovery_timeout_ms: u64,
    pub message_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            application_id: DEFAULT_APP_ID.to_owned(),
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            message_timeout_ms: DEFAULT_MESSAGE_TIMEOUT_MS,
        }
    }
}
