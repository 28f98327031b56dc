use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A cooperative cancellation flag shared between a caller and a long scan
///
/// Scans poll the flag at record granularity and abort with [`Error::Canceled`].
/// Clones share the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}
impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every scan holding a clone of this flag
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// Clears a previous cancellation request so the flag can be reused
    pub fn reset(&self) {
        self.inner.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Returns [`Error::Canceled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}
