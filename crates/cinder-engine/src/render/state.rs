use crate::device::{BlendMode, CullMode, DepthState, GraphicsDevice, IndexFormat, ObjectName};

/// Mirror of the device's bound state.
///
/// Every setter forwards to the device only when the requested value differs
/// from the tracked one, and reports whether it did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineState {
    program: Option<ObjectName>,
    vertex_buffer: Option<ObjectName>,
    index_buffer: Option<(ObjectName, IndexFormat)>,
    texture: Option<Option<ObjectName>>,
    blend: Option<BlendMode>,
    depth: Option<DepthState>,
    cull: Option<CullMode>,
}

fn changed<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        return false;
    }
    *slot = Some(value);
    true
}

impl PipelineState {
    /// Forgets everything; the next request for each state is always issued.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn bind_program(&mut self, device: &mut impl GraphicsDevice, program: ObjectName) -> bool {
        let issue = changed(&mut self.program, program);
        if issue {
            device.bind_program(program);
        }
        issue
    }

    pub fn bind_vertex_buffer(
        &mut self,
        device: &mut impl GraphicsDevice,
        buffer: ObjectName,
    ) -> bool {
        let issue = changed(&mut self.vertex_buffer, buffer);
        if issue {
            device.bind_vertex_buffer(buffer);
        }
        issue
    }

    pub fn bind_index_buffer(
        &mut self,
        device: &mut impl GraphicsDevice,
        buffer: ObjectName,
        format: IndexFormat,
    ) -> bool {
        let issue = changed(&mut self.index_buffer, (buffer, format));
        if issue {
            device.bind_index_buffer(buffer, format);
        }
        issue
    }

    pub fn bind_texture(
        &mut self,
        device: &mut impl GraphicsDevice,
        texture: Option<ObjectName>,
    ) -> bool {
        let issue = changed(&mut self.texture, texture);
        if issue {
            device.bind_texture(texture);
        }
        issue
    }

    pub fn set_blend(&mut self, device: &mut impl GraphicsDevice, blend: BlendMode) -> bool {
        let issue = changed(&mut self.blend, blend);
        if issue {
            device.set_blend(blend);
        }
        issue
    }

    pub fn set_depth(&mut self, device: &mut impl GraphicsDevice, depth: DepthState) -> bool {
        let issue = changed(&mut self.depth, depth);
        if issue {
            device.set_depth(depth);
        }
        issue
    }

    pub fn set_cull(&mut self, device: &mut impl GraphicsDevice, cull: CullMode) -> bool {
        let issue = changed(&mut self.cull, cull);
        if issue {
            device.set_cull(cull);
        }
        issue
    }
}
