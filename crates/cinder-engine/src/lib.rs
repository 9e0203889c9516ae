//! Cinder engine crate.
//!
//! This crate owns the frame rendering core: the live device/window context, GPU
//! resource lifetimes, the per-frame scheduling loop and the camera/transform math
//! feeding the draw stream.

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod input;
pub mod logging;
pub mod platform;
pub mod render;
pub mod resource;
pub mod scheduler;
pub mod surface;
pub mod time;
pub mod transform;

pub use error::{Error, Result};
