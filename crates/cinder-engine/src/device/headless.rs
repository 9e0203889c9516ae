//! In-memory graphics device.
//!
//! Records every call it receives and tracks object lifetimes, fences and frame
//! state the way a real device would, without touching a GPU. Failures can be
//! injected through a `HeadlessProbe`, which stays usable after the device has
//! been moved into a registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::resource::{BufferDescriptor, ProgramDescriptor, ResourceKind, TextureDescriptor};

use super::{
    BlendMode, ClearColor, CullMode, DepthState, DeviceError, DeviceErrorCode, DeviceObject,
    DrawConstants, FrameAcquire, GraphicsDevice, IndexFormat, ObjectName, TextureRegion,
};

const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { name: ObjectName, size: u64 },
    CreateTexture { name: ObjectName, width: u32, height: u32 },
    CreateProgram { name: ObjectName },
    Destroy(DeviceObject),
    WriteBuffer { buffer: ObjectName, offset: u64, len: usize },
    WriteTexture { texture: ObjectName, region: TextureRegion },
    Resize { width: u32, height: u32 },
    BeginFrame(ClearColor),
    BindProgram(ObjectName),
    BindVertexBuffer(ObjectName),
    BindIndexBuffer(ObjectName, IndexFormat),
    BindTexture(Option<ObjectName>),
    SetBlend(BlendMode),
    SetDepth(DepthState),
    SetCull(CullMode),
    Draw { index_count: u32, constants: DrawConstants },
    Submit(u64),
    WaitIdle,
}

impl DeviceCall {
    /// Whether the call changes pipeline or binding state.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            DeviceCall::BindProgram(_)
                | DeviceCall::BindVertexBuffer(_)
                | DeviceCall::BindIndexBuffer(..)
                | DeviceCall::BindTexture(_)
                | DeviceCall::SetBlend(_)
                | DeviceCall::SetDepth(_)
                | DeviceCall::SetCull(_)
        )
    }
}

#[derive(Debug)]
struct State {
    calls: Vec<DeviceCall>,
    next_name: u64,
    objects: HashMap<ObjectName, (ResourceKind, u64)>,

    max_texture_dimension: u32,
    fence_lag: u64,
    submitted: u64,
    completed: u64,
    frames_submitted: u64,

    size: (u32, u32),
    recording: bool,
    lost: bool,
    acquire_failure: Option<DeviceErrorCode>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            next_name: 1,
            objects: HashMap::new(),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            fence_lag: 0,
            submitted: 0,
            completed: 0,
            frames_submitted: 0,
            size: (0, 0),
            recording: false,
            lost: false,
            acquire_failure: None,
        }
    }
}

/// Shared view of a `HeadlessDevice`: inspection and failure injection.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<State>>,
}

impl HeadlessProbe {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Calls received since the most recent `begin_frame`.
    pub fn last_frame_calls(&self) -> Vec<DeviceCall> {
        let state = self.lock();
        let start = state
            .calls
            .iter()
            .rposition(|c| matches!(c, DeviceCall::BeginFrame(_)))
            .unwrap_or(0);
        state.calls[start..].to_vec()
    }

    /// Objects created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.lock().frames_submitted
    }

    /// Current presentation target size.
    pub fn size(&self) -> (u32, u32) {
        self.lock().size
    }

    /// Textures larger than `max` in either dimension are rejected.
    pub fn set_max_texture_dimension(&self, max: u32) {
        self.lock().max_texture_dimension = max;
    }

    /// Keeps the completed fence `lag` submissions behind the latest one.
    pub fn set_fence_lag(&self, lag: u64) {
        let mut state = self.lock();
        state.fence_lag = lag;
        state.completed = state.completed.min(state.submitted.saturating_sub(lag));
    }

    /// Makes the next `begin_frame` fail with `code`.
    ///
    /// Surface codes (lost, timeout) are recovered by the device and turn into
    /// a skipped frame; anything else is returned as an error.
    pub fn fail_next_acquire(&self, code: DeviceErrorCode) {
        self.lock().acquire_failure = Some(code);
    }

    /// Simulates device removal: every later call fails with `DeviceLost`.
    pub fn lose_device(&self) {
        self.lock().lost = true;
    }
}

/// Graphics device that records calls instead of rendering.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    probe: HeadlessProbe,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting the device after it has been moved.
    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }

    fn create(&mut self, kind: ResourceKind, extent: u64) -> Result<ObjectName, DeviceError> {
        let mut state = self.probe.lock();
        if state.lost {
            return Err(lost());
        }
        let name = ObjectName::new(state.next_name)
            .ok_or_else(|| DeviceError::new(DeviceErrorCode::OutOfMemory, "object names exhausted"))?;
        state.next_name += 1;
        state.objects.insert(name, (kind, extent));
        Ok(name)
    }

    fn record(&mut self, call: DeviceCall) {
        self.probe.lock().calls.push(call);
    }
}

fn lost() -> DeviceError {
    DeviceError::new(DeviceErrorCode::DeviceLost, "headless device was removed")
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<ObjectName, DeviceError> {
        let name = self.create(ResourceKind::Buffer, desc.size)?;
        self.record(DeviceCall::CreateBuffer {
            name,
            size: desc.size,
        });
        Ok(name)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<ObjectName, DeviceError> {
        let max = self.probe.lock().max_texture_dimension;
        if desc.width > max || desc.height > max {
            return Err(DeviceError::new(
                DeviceErrorCode::UnsupportedFormat,
                format!(
                    "texture {}x{} exceeds the maximum dimension {max}",
                    desc.width, desc.height
                ),
            ));
        }

        let name = self.create(ResourceKind::Texture, desc.byte_len())?;
        self.record(DeviceCall::CreateTexture {
            name,
            width: desc.width,
            height: desc.height,
        });
        Ok(name)
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> Result<ObjectName, DeviceError> {
        for entry in [&desc.vertex_entry, &desc.fragment_entry] {
            if !desc.source.contains(&format!("fn {entry}")) {
                return Err(DeviceError::new(
                    DeviceErrorCode::ShaderCompilation,
                    format!("entry point `{entry}` not found"),
                ));
            }
        }

        let name = self.create(ResourceKind::Program, 0)?;
        self.record(DeviceCall::CreateProgram { name });
        Ok(name)
    }

    fn destroy_object(&mut self, object: DeviceObject) {
        let mut state = self.probe.lock();
        if state.objects.remove(&object.name).is_none() {
            log::warn!("headless: destroy of unknown object {}", object.name);
        }
        state.calls.push(DeviceCall::Destroy(object));
    }

    fn write_buffer(
        &mut self,
        buffer: ObjectName,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut state = self.probe.lock();
        if state.lost {
            return Err(lost());
        }
        match state.objects.get(&buffer) {
            Some((ResourceKind::Buffer, extent)) if offset + data.len() as u64 <= *extent => {}
            _ => {
                return Err(DeviceError::new(
                    DeviceErrorCode::InvalidDescriptor,
                    format!("invalid buffer write to {buffer}"),
                ));
            }
        }
        state.calls.push(DeviceCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn write_texture(
        &mut self,
        texture: ObjectName,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut state = self.probe.lock();
        if state.lost {
            return Err(lost());
        }
        let expected = u64::from(region.rows) * u64::from(region.bytes_per_row);
        if !matches!(state.objects.get(&texture), Some((ResourceKind::Texture, _)))
            || data.len() as u64 != expected
        {
            return Err(DeviceError::new(
                DeviceErrorCode::InvalidDescriptor,
                format!("invalid texture write to {texture}"),
            ));
        }
        state.calls.push(DeviceCall::WriteTexture { texture, region });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut state = self.probe.lock();
        state.size = (width, height);
        state.calls.push(DeviceCall::Resize { width, height });
    }

    fn begin_frame(&mut self, clear: ClearColor) -> Result<FrameAcquire, DeviceError> {
        let mut state = self.probe.lock();
        if state.lost {
            return Err(lost());
        }
        state.calls.push(DeviceCall::BeginFrame(clear));

        match state.acquire_failure.take() {
            Some(DeviceErrorCode::SurfaceLost | DeviceErrorCode::SurfaceTimeout) => {
                log::debug!("headless: surface unavailable, skipping frame");
                Ok(FrameAcquire::Skip)
            }
            Some(code) => {
                if code.is_fatal() {
                    state.lost = true;
                }
                Err(DeviceError::new(code, "injected acquire failure"))
            }
            None => {
                state.recording = true;
                Ok(FrameAcquire::Ready)
            }
        }
    }

    fn bind_program(&mut self, program: ObjectName) {
        self.record(DeviceCall::BindProgram(program));
    }

    fn bind_vertex_buffer(&mut self, buffer: ObjectName) {
        self.record(DeviceCall::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: ObjectName, format: IndexFormat) {
        self.record(DeviceCall::BindIndexBuffer(buffer, format));
    }

    fn bind_texture(&mut self, texture: Option<ObjectName>) {
        self.record(DeviceCall::BindTexture(texture));
    }

    fn set_blend(&mut self, blend: BlendMode) {
        self.record(DeviceCall::SetBlend(blend));
    }

    fn set_depth(&mut self, depth: DepthState) {
        self.record(DeviceCall::SetDepth(depth));
    }

    fn set_cull(&mut self, cull: CullMode) {
        self.record(DeviceCall::SetCull(cull));
    }

    fn draw_indexed(&mut self, constants: &DrawConstants, index_count: u32) {
        let mut state = self.probe.lock();
        if !state.recording {
            log::warn!("headless: draw outside of an acquired frame ignored");
            return;
        }
        state.calls.push(DeviceCall::Draw {
            index_count,
            constants: *constants,
        });
    }

    fn submit(&mut self, fence: u64) -> Result<(), DeviceError> {
        let mut state = self.probe.lock();
        if state.lost {
            return Err(lost());
        }
        state.recording = false;
        state.calls.push(DeviceCall::Submit(fence));
        state.frames_submitted += 1;
        state.submitted = state.submitted.max(fence);
        let retired = state.submitted.saturating_sub(state.fence_lag);
        state.completed = state.completed.max(retired);
        Ok(())
    }

    fn completed_fence(&mut self) -> u64 {
        self.probe.lock().completed
    }

    fn wait_idle(&mut self) {
        let mut state = self.probe.lock();
        state.completed = state.submitted;
        state.calls.push(DeviceCall::WaitIdle);
    }
}
