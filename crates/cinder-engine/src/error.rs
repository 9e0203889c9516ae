use std::ops::Range;

use thiserror::Error;

use crate::device::DeviceErrorCode;
use crate::resource::{BufferUsage, ResourceHandle, ResourceKind};

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy of the frame rendering core.
///
/// `Platform` and `DeviceLost` are fatal: the scheduler shuts down and the error
/// reaches the top-level caller. Everything else is recoverable per call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The display, window or graphics device could not be acquired.
    #[error("platform error: {0}")]
    Platform(String),

    /// `Context::acquire` was called while another context is live.
    #[error("a graphics context is already live in this process")]
    ContextAlreadyLive,

    /// A second surface was opened against the same context.
    #[error("a surface is already open for this context")]
    SurfaceAlreadyOpen,

    /// The device rejected a resource descriptor.
    #[error("failed to create {kind}: {message} ({code:?})")]
    ResourceCreation {
        kind: ResourceKind,
        code: DeviceErrorCode,
        message: String,
    },

    /// The handle refers to a destroyed generation or to another context.
    #[error("stale resource handle {0}")]
    StaleHandle(ResourceHandle),

    /// The handle's slot was never allocated by this registry.
    #[error("unknown resource handle {0}")]
    NotFound(ResourceHandle),

    /// A buffer is bound in a role it was not created for.
    #[error("{handle} is a {actual:?} buffer, expected {expected:?}")]
    WrongBufferUsage {
        handle: ResourceHandle,
        expected: BufferUsage,
        actual: BufferUsage,
    },

    /// A byte range falls outside the resource's allocated extent.
    #[error("byte range {range:?} is out of range for {handle} (extent {extent} bytes)")]
    OutOfRange {
        handle: ResourceHandle,
        range: Range<u64>,
        extent: u64,
    },

    /// The registry was shut down; it no longer creates or writes objects.
    #[error("resource registry is shut down")]
    RegistryShutDown,

    /// The device is gone; every handle of the context is now invalid.
    #[error("graphics device lost: {0}")]
    DeviceLost(String),

    /// A draw or end-of-frame call arrived outside `begin_frame`/`end_frame`.
    #[error("no frame is being recorded")]
    FrameNotRecording,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Image bytes could not be decoded into a texture.
    #[error("image decode error: {0}")]
    Image(String),
}

impl Error {
    /// Whether this error must terminate the frame loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Platform(_) | Error::DeviceLost(_))
    }

    /// Whether this error is a handle validity failure (stale or unknown).
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::StaleHandle(_) | Error::NotFound(_))
    }
}
