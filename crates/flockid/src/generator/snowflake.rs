use core::time::Duration;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, IdParts, Result, SEQUENCE_MASK,
    generator::{ClockDriftPolicy, GeneratorConfig},
    time::TimeSource,
};

/// Mutable state of a [`SnowflakeGenerator`].
///
/// `last_timestamp` never decreases across successful generations, and
/// `sequence` restarts at zero whenever it advances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratorState {
    /// Wall-clock milliseconds embedded in the most recent id.
    pub last_timestamp: u64,
    /// Sequence embedded in the most recent id.
    pub sequence: u16,
}

/// A lock-based Snowflake generator bound to one coordinator-assigned
/// identity.
///
/// Every call to [`SnowflakeGenerator::next_id`] runs as a single critical
/// section over [`GeneratorState`], which makes ids strictly increasing across
/// all threads sharing the generator. When the sequence for the current
/// millisecond is exhausted, or the clock has drifted backward by an amount
/// the [`ClockDriftPolicy`] accepts, the call waits for the clock while
/// holding the lock.
///
/// # Example
///
/// ```
/// use flockid::{GeneratorConfig, SnowflakeGenerator, SystemClock};
///
/// let generator = SnowflakeGenerator::new(7, GeneratorConfig::default(), SystemClock);
/// let a = generator.next_id().unwrap();
/// let b = generator.next_id().unwrap();
/// assert!(a < b);
/// assert_eq!(generator.decode(b).identity, 7);
/// ```
pub struct SnowflakeGenerator<T> {
    identity: u16,
    config: GeneratorConfig,
    pub(crate) state: Mutex<GeneratorState>,
    pub(crate) time: T,
}

impl<T: TimeSource> SnowflakeGenerator<T> {
    /// Creates a generator with an empty state.
    ///
    /// `identity` must not exceed [`MAX_WORKER_ID`]; the coordinator never
    /// assigns a larger one.
    ///
    /// [`MAX_WORKER_ID`]: crate::MAX_WORKER_ID
    pub fn new(identity: u16, config: GeneratorConfig, time: T) -> Self {
        Self::from_components(identity, GeneratorState::default(), config, time)
    }

    /// Creates a generator preloaded with `state`.
    ///
    /// Mostly useful in tests, or to resume from a previously observed
    /// timestamp.
    pub fn from_components(
        identity: u16,
        state: GeneratorState,
        config: GeneratorConfig,
        time: T,
    ) -> Self {
        debug_assert!(identity <= crate::MAX_WORKER_ID);
        Self {
            identity,
            config,
            state: Mutex::new(state),
            time,
        }
    }

    pub const fn identity(&self) -> u16 {
        self.identity
    }

    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub const fn policy(&self) -> ClockDriftPolicy {
        self.config.policy()
    }

    /// A copy of the current state.
    pub fn state(&self) -> GeneratorState {
        *self.state.lock()
    }

    /// Splits an id issued by this generator into its fields.
    pub const fn decode(&self, id: u64) -> IdParts {
        self.config.layout().decode(id)
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockMovedBackward`] when the clock reads earlier than
    /// the last issued timestamp and the drift policy refuses to wait. The
    /// generator never retries on its own; backing off is up to the caller.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(identity = self.identity)))]
    pub fn next_id(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let mut now = self.time.current_millis();

        if now < state.last_timestamp {
            now = self.cold_clock_behind(now, state.last_timestamp)?;
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_past(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = now;

        let delta = now.wrapping_sub(self.config.epoch_millis());
        Ok(self
            .config
            .layout()
            .encode(delta, self.identity, state.sequence))
    }

    /// Applies the drift policy until the clock is no longer behind `last`.
    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, mut now: u64, last: u64) -> Result<u64> {
        let policy = self.config.policy();
        while now < last {
            let drift = last - now;
            if !policy.tolerates(drift, self.config.max_wait_ms()) {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    identity = self.identity,
                    drift_ms = drift,
                    %policy,
                    "clock moved backward, refusing to generate id"
                );
                return Err(Error::ClockMovedBackward { last, now });
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(drift_ms = drift, %policy, "clock moved backward, waiting");
            now = self.wait_past(last);
        }
        Ok(now)
    }

    /// Resamples the clock until it reads strictly later than `last`.
    ///
    /// Sleeps while more than a millisecond remains and spins through the
    /// final millisecond so the common sequence-exhaustion case stays
    /// sub-millisecond.
    fn wait_past(&self, last: u64) -> u64 {
        loop {
            let now = self.time.current_millis();
            if now > last {
                return now;
            }
            let remaining = last - now;
            if remaining > 1 {
                std::thread::sleep(Duration::from_millis(remaining - 1));
            } else {
                core::hint::spin_loop();
            }
        }
    }
}

impl<T> core::fmt::Debug for SnowflakeGenerator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnowflakeGenerator")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
