//! GPU resource ownership.
//!
//! The registry is the sole owner of device object lifetimes. Everything else
//! holds `ResourceHandle`s: generation-counted slot indices that fail fast once
//! the object they named is gone.

mod descriptor;
mod handle;
pub mod image;
mod queue;
mod registry;

pub use descriptor::{
    BufferDescriptor, BufferUsage, PixelFormat, ProgramDescriptor, ResourceDescriptor,
    TextureDescriptor, TextureFilter,
};
pub use handle::{ResourceHandle, ResourceKind};
pub use queue::{PendingResource, ResourceRequester};
pub use registry::{RegistryStats, ResourceRegistry};
