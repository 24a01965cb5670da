use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::{
    Error, GeneratorConfig, RegistrationIdentity, Result, SnowflakeGenerator, TimeSource,
};

/// Where a worker process stands with respect to its coordinator.
///
/// Transitions only move forward: `Unregistered -> Active -> Terminated`, or
/// straight to `Terminated` when registration never succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    Unregistered = 0,
    Active = 1,
    Terminated = 2,
}

impl Lifecycle {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unregistered,
            1 => Self::Active,
            _ => Self::Terminated,
        }
    }
}

/// A worker process's identity and generator.
///
/// The generator only exists once [`WorkerNode::activate`] has bound the
/// coordinator-assigned identity, and stops serving for good after
/// [`WorkerNode::terminate`].
pub struct WorkerNode<T> {
    lifecycle: AtomicU8,
    registration: OnceLock<RegistrationIdentity>,
    generator: OnceLock<SnowflakeGenerator<T>>,
    config: GeneratorConfig,
    time: T,
}

impl<T: TimeSource + Clone> WorkerNode<T> {
    pub const fn new(config: GeneratorConfig, time: T) -> Self {
        Self {
            lifecycle: AtomicU8::new(Lifecycle::Unregistered as u8),
            registration: OnceLock::new(),
            generator: OnceLock::new(),
            config,
            time,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    /// The accepted registration, if any. Still available after termination.
    pub fn registration(&self) -> Option<&RegistrationIdentity> {
        self.registration.get()
    }

    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Binds the assigned identity and starts serving ids.
    ///
    /// Returns `false`, leaving the node unchanged, unless it is still
    /// [`Lifecycle::Unregistered`].
    pub fn activate(&self, registration: RegistrationIdentity) -> bool {
        if self.lifecycle() != Lifecycle::Unregistered {
            return false;
        }
        let identity = registration.identity;
        if self.registration.set(registration).is_err() {
            return false;
        }
        let generator = SnowflakeGenerator::new(identity, self.config, self.time.clone());
        if self.generator.set(generator).is_err() {
            return false;
        }
        let activated = self
            .lifecycle
            .compare_exchange(
                Lifecycle::Unregistered as u8,
                Lifecycle::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        #[cfg(feature = "tracing")]
        if activated {
            tracing::info!(identity, "worker activated");
        }
        activated
    }

    /// Stops serving ids permanently and returns the previous state.
    pub fn terminate(&self) -> Lifecycle {
        let previous = Lifecycle::from_u8(
            self.lifecycle
                .swap(Lifecycle::Terminated as u8, Ordering::AcqRel),
        );
        #[cfg(feature = "tracing")]
        if previous != Lifecycle::Terminated {
            tracing::warn!(?previous, "worker terminated");
        }
        previous
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] unless the node is [`Lifecycle::Active`], and
    /// [`Error::ClockMovedBackward`] when the drift policy refuses.
    pub fn next_id(&self) -> Result<u64> {
        if !self.is_active() {
            return Err(Error::NotRegistered);
        }
        self.generator
            .get()
            .ok_or(Error::NotRegistered)?
            .next_id()
    }
}

impl<T> core::fmt::Debug for WorkerNode<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerNode")
            .field(
                "lifecycle",
                &Lifecycle::from_u8(self.lifecycle.load(Ordering::Relaxed)),
            )
            .field("registration", &self.registration.get())
            .field("generator", &self.generator.get())
            .finish_non_exhaustive()
    }
}
