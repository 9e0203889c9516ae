use crate::input::InputSnapshot;

/// Per-iteration state handed to the update and render callbacks.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    /// Clamped seconds since the previous iteration.
    pub delta_time: f32,
    /// Sum of clamped deltas since the scheduler was created.
    pub elapsed: f64,
    pub frame_index: u64,
    pub input: InputSnapshot,
    /// Framebuffer size in physical pixels, fixed for the whole iteration.
    pub surface_size: (u32, u32),
    /// The size changed since the previous iteration.
    pub resized: bool,
}
