//! Frame scheduler.
//!
//! Drives one cooperative loop on the thread that owns the window and the
//! device: poll input, advance time, update, record, submit, present. A close
//! request is honored at iteration boundaries only, so a frame that has started
//! is always carried through `Presented`.

mod app;
mod driver;
mod frame;
mod phase;

pub use app::{App, AppControl, FrameRecorder, UpdateCtx};
pub use driver::FrameScheduler;
pub use frame::FrameState;
pub use phase::Phase;
