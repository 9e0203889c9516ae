//! Time subsystem.
//!
//! Frame timing is driven by a `TimeSource` so that pacing can be exercised
//! deterministically. Intended usage:
//! - one `FrameClock` per frame loop
//! - call `tick()` once per iteration to obtain `FrameTime`

mod frame_clock;
mod source;

pub use frame_clock::{FrameClock, FrameTime};
pub use source::{ManualClock, MonotonicClock, TimeSource};
