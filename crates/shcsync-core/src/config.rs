// ── Engine configuration ──
//
// Static settings handed to `Engine::new`. Validation happens once at
// construction; an invalid namespace is the only fatal engine error.

use std::fmt;
use std::time::Duration;

use crate::error::CoreError;

/// Long-poll timing. Delays are applied after a failed round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// How long the hub may hold a poll open. Default: 30s.
    pub wait: Duration,
    /// Extra client-side allowance on top of `wait`. Default: 2s.
    pub grace: Duration,
    /// Delay before polling again after a non-success status or a generic
    /// transport failure. Default: 10s.
    pub error_delay: Duration,
    /// Delay before polling again while the hub reports 503 (still
    /// starting). Default: 30s.
    pub unavailable_delay: Duration,
    /// Delay before re-subscribing once the handle is considered stale.
    /// Default: 5s.
    pub resubscribe_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(30),
            grace: Duration::from_secs(2),
            error_delay: Duration::from_secs(10),
            unavailable_delay: Duration::from_secs(30),
            resubscribe_delay: Duration::from_secs(5),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of every full-namespace address, e.g. `shcsync.0`.
    pub namespace: String,
    /// Minimum spacing between outbound writes. Zero disables limiting.
    pub rate_limit: Duration,
    /// Deadline for discovery fetches and single-record lookups.
    pub long_timeout: Duration,
    pub poll: PollConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "shcsync.0".into(),
            rate_limit: Duration::from_millis(1000),
            long_timeout: Duration::from_millis(5000),
            poll: PollConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<Namespace, CoreError> {
        if self.long_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "long_timeout must be greater than zero".into(),
            });
        }
        if self.poll.wait.is_zero() {
            return Err(CoreError::Config {
                message: "poll wait must be greater than zero".into(),
            });
        }
        Namespace::parse(&self.namespace)
    }
}

// ── Namespace ───────────────────────────────────────────────────────

/// Validated instance namespace. Handlers address nodes relative to it;
/// the node cache and local-change events use the qualified form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::Config {
            message: format!("invalid namespace '{raw}': {reason}"),
        };

        if raw.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if raw.starts_with('.') || raw.ends_with('.') || raw.contains("..") {
            return Err(invalid("segments must not be empty"));
        }
        if raw.chars().any(|c| c.is_whitespace() || c == '*') {
            return Err(invalid("must not contain whitespace or '*'"));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `relative` -> `<namespace>.<relative>`
    pub fn qualify(&self, relative: &str) -> String {
        format!("{}.{relative}", self.0)
    }

    /// Inverse of [`qualify`](Self::qualify). `None` for foreign addresses.
    pub fn strip<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(self.0.as_str())?.strip_prefix('.')
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_timings() {
        let poll = PollConfig::default();
        assert_eq!(poll.wait, Duration::from_secs(30));
        assert!(poll.unavailable_delay > poll.error_delay);
        assert!(poll.resubscribe_delay < poll.error_delay);
    }

    #[test]
    fn namespace_round_trip() {
        let ns = Namespace::parse("shcsync.0").unwrap();
        let full = ns.qualify("hdm:HomeMaticIP:1.TemperatureLevel.temperature");
        assert_eq!(full, "shcsync.0.hdm:HomeMaticIP:1.TemperatureLevel.temperature");
        assert_eq!(
            ns.strip(&full),
            Some("hdm:HomeMaticIP:1.TemperatureLevel.temperature")
        );
        assert_eq!(ns.strip("shcsync.01.x"), None);
        assert_eq!(ns.strip("other.0.x"), None);
    }

    #[test]
    fn rejects_malformed_namespace() {
        for raw in ["", ".shc", "shc.", "a..b", "shc 0", "shc.*"] {
            assert!(
                matches!(Namespace::parse(raw), Err(CoreError::Config { .. })),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let config = EngineConfig {
            long_timeout: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }
}
