//! The live device/window association.
//!
//! Exactly one `Context` may be live per process at a time. Every component
//! constructor takes the context explicitly; nothing reads ambient global state
//! except the single-instantiation guard below.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::{Error, Result};

static LIVE: AtomicBool = AtomicBool::new(false);
static NEXT_EPOCH: AtomicU32 = AtomicU32::new(1);

/// Shared handle to the live graphics context.
///
/// Clones refer to the same context. The context is destroyed when the last
/// clone is dropped, after which a new one may be acquired. Resource handles
/// carry the epoch of the context that issued them.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    epoch: u32,
    surface_open: AtomicBool,
    lost: AtomicBool,
}

impl Context {
    /// Acquires the process-wide context.
    ///
    /// Fails with `Error::ContextAlreadyLive` while another context exists.
    pub fn acquire() -> Result<Self> {
        if LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ContextAlreadyLive);
        }

        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        log::debug!("context {epoch} acquired");

        Ok(Self {
            inner: Arc::new(ContextInner {
                epoch,
                surface_open: AtomicBool::new(false),
                lost: AtomicBool::new(false),
            }),
        })
    }

    /// Identifier distinguishing this context from earlier ones.
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.inner.epoch
    }

    /// Whether the device was reported lost.
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.inner.lost.load(Ordering::Acquire)
    }

    /// Marks the device as lost. All resources of this context become invalid.
    pub fn mark_lost(&self) {
        if !self.inner.lost.swap(true, Ordering::AcqRel) {
            log::error!("context {} lost its device", self.inner.epoch);
        }
    }

    /// Fails with `Error::DeviceLost` once the device is gone.
    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_lost() {
            return Err(Error::DeviceLost(format!(
                "context {} is no longer usable",
                self.inner.epoch
            )));
        }
        Ok(())
    }

    pub(crate) fn claim_surface(&self) -> Result<()> {
        self.inner
            .surface_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::SurfaceAlreadyOpen)
    }

    pub(crate) fn release_surface(&self) {
        self.inner.surface_open.store(false, Ordering::Release);
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        log::debug!("context {} destroyed", self.epoch);
        LIVE.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("epoch", &self.inner.epoch)
            .field("lost", &self.is_lost())
            .finish()
    }
}

/// Serializes tests that acquire the process-wide context.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::Mutex;
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
