use core::{fmt, str::FromStr};

use crate::{DEFAULT_EPOCH_MILLIS, IdLayout};

/// Backward drift the `auto` policy absorbs by waiting, regardless of the
/// configured bound.
pub const AUTO_DRIFT_TOLERANCE_MS: u64 = 30;

/// Upper limit for the `wait` policy's bound.
pub const MAX_WAIT_BOUND_MS: u64 = 1_000;

/// Default bound for the `wait` policy.
pub const DEFAULT_WAIT_BOUND_MS: u64 = 30;

/// How a generator reacts when the clock reads earlier than the last issued
/// timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClockDriftPolicy {
    /// Refuse immediately.
    Reject,
    /// Block until the clock catches up, as long as the drift is within the
    /// configured bound.
    Wait,
    /// Block for drifts up to [`AUTO_DRIFT_TOLERANCE_MS`], refuse otherwise.
    #[default]
    Auto,
}

impl ClockDriftPolicy {
    /// Whether a backward drift of `drift_ms` should be waited out.
    pub const fn tolerates(self, drift_ms: u64, max_wait_ms: u64) -> bool {
        match self {
            Self::Reject => false,
            Self::Wait => drift_ms <= max_wait_ms,
            Self::Auto => drift_ms <= AUTO_DRIFT_TOLERANCE_MS,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Wait => "wait",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ClockDriftPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockDriftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "wait" => Ok(Self::Wait),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown clock drift strategy `{other}`")),
        }
    }
}

/// Immutable settings of a [`SnowflakeGenerator`].
///
/// [`SnowflakeGenerator`]: crate::SnowflakeGenerator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    policy: ClockDriftPolicy,
    max_wait_ms: u64,
    epoch_millis: u64,
    layout: IdLayout,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(
            ClockDriftPolicy::default(),
            DEFAULT_WAIT_BOUND_MS,
            DEFAULT_EPOCH_MILLIS,
        )
    }
}

impl GeneratorConfig {
    /// Builds a configuration using [`IdLayout::STANDARD`].
    ///
    /// `max_wait_ms` is clamped to [`MAX_WAIT_BOUND_MS`].
    pub const fn new(policy: ClockDriftPolicy, max_wait_ms: u64, epoch_millis: u64) -> Self {
        Self {
            policy,
            max_wait_ms: clamp_wait_bound(max_wait_ms),
            epoch_millis,
            layout: IdLayout::STANDARD,
        }
    }

    #[must_use]
    pub const fn with_layout(mut self, layout: IdLayout) -> Self {
        self.layout = layout;
        self
    }

    pub const fn policy(&self) -> ClockDriftPolicy {
        self.policy
    }

    pub const fn max_wait_ms(&self) -> u64 {
        self.max_wait_ms
    }

    pub const fn epoch_millis(&self) -> u64 {
        self.epoch_millis
    }

    pub const fn layout(&self) -> IdLayout {
        self.layout
    }
}

/// Caps a wait bound at [`MAX_WAIT_BOUND_MS`].
pub const fn clamp_wait_bound(max_wait_ms: u64) -> u64 {
    if max_wait_ms > MAX_WAIT_BOUND_MS {
        MAX_WAIT_BOUND_MS
    } else {
        max_wait_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("REJECT".parse::<ClockDriftPolicy>(), Ok(ClockDriftPolicy::Reject));
        assert_eq!("Wait".parse::<ClockDriftPolicy>(), Ok(ClockDriftPolicy::Wait));
        assert_eq!(" auto".parse::<ClockDriftPolicy>(), Ok(ClockDriftPolicy::Auto));
        assert!("sleep".parse::<ClockDriftPolicy>().is_err());
    }

    #[test]
    fn tolerance_per_policy() {
        assert!(!ClockDriftPolicy::Reject.tolerates(1, 1_000));
        assert!(ClockDriftPolicy::Wait.tolerates(500, 500));
        assert!(!ClockDriftPolicy::Wait.tolerates(501, 500));
        assert!(ClockDriftPolicy::Auto.tolerates(30, 0));
        assert!(!ClockDriftPolicy::Auto.tolerates(31, 1_000));
    }

    #[test]
    fn wait_bound_is_clamped() {
        let config = GeneratorConfig::new(ClockDriftPolicy::Wait, 5_000, 0);
        assert_eq!(config.max_wait_ms(), MAX_WAIT_BOUND_MS);
        let config = GeneratorConfig::new(ClockDriftPolicy::Wait, 999, 0);
        assert_eq!(config.max_wait_ms(), 999);
    }

    #[test]
    fn defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.policy(), ClockDriftPolicy::Auto);
        assert_eq!(config.max_wait_ms(), DEFAULT_WAIT_BOUND_MS);
        assert_eq!(config.epoch_millis(), DEFAULT_EPOCH_MILLIS);
        assert_eq!(config.layout(), IdLayout::STANDARD);
    }
}
