//! Backend selection module.
//!
//! This module defines how a [`Queue`](crate::device::Queue) executes its
//! work and provides functions to set and get the process-wide default.
//!
//! # Supported Backends
//!
//! - `Parallel`: a multi-threaded rayon pool; every kernel spreads its
//!   work-items over all lanes (default).
//! - `Serial`: a single-lane pool. Work still runs off the issuing thread,
//!   but one unit at a time.
//!
//! The default is stored globally in an `AtomicU8` and consulted when a
//! [`QueueConfig`](crate::device::QueueConfig) is created without an explicit
//! backend. Changing it never affects queues that already exist.

use core::convert::TryFrom;
use core::str::FromStr;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Multi-lane rayon pool (default).
    #[default]
    Parallel = 0,
    /// Single-lane pool.
    Serial,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Parallel),
            1 => Ok(Self::Serial),
            _ => Err(()),
        }
    }
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "serial" => Ok(Self::Serial),
            _ => Err(()),
        }
    }
}

/// Internal global state for the default backend.
///
/// Relaxed consistency is enough in practice; acquire/release keeps a
/// `set_backend` on one thread visible to queues built afterwards elsewhere.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Parallel as u8);

/// Sets the backend used by queues configured afterwards.
///
/// # Example
///
/// ```
/// use arcwise::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Serial);
/// assert_eq!(get_backend(), Backend::Serial);
/// set_backend(Backend::Parallel);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the current default backend.
///
/// If the stored value is invalid, defaults to [`Backend::Parallel`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
