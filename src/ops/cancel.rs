// ============================================================================
// CANCELLATION - cooperative stop flag for the long-running operations
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{OpError, OpResult};

/// Shared flag polled by the median filter, Otsu, Kapur and skeletonization.
/// Clones share the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// A flag nobody holds a handle to; never fires.
    pub fn never() -> Self {
        Self::new()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Cancellation point: `Err(Cancelled)` once the flag has been raised.
    #[inline]
    pub fn check(&self) -> OpResult<()> {
        if self.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }
}
