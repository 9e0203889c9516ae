use crate::device::{DeviceError, DeviceErrorCode};

pub(super) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(super) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Falls back to FIFO, which every surface supports.
pub(super) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::PresentMode,
) -> wgpu::PresentMode {
    match requested {
        wgpu::PresentMode::AutoVsync | wgpu::PresentMode::AutoNoVsync => requested,
        mode if caps.present_modes.contains(&mode) => mode,
        mode => {
            log::warn!("present mode {mode:?} unsupported by the surface; using Fifo");
            wgpu::PresentMode::Fifo
        }
    }
}

/// Response to a failed frame acquisition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum SurfaceErrorAction {
    /// Reconfigure the surface, then skip this frame.
    Reconfigure,
    /// Transient; skip this frame.
    SkipFrame,
    /// The device cannot continue.
    Fatal,
}

pub(super) fn classify_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

pub(super) fn surface_error_code(err: &wgpu::SurfaceError) -> DeviceErrorCode {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => DeviceErrorCode::SurfaceLost,
        wgpu::SurfaceError::OutOfMemory => DeviceErrorCode::OutOfMemory,
        wgpu::SurfaceError::Timeout => DeviceErrorCode::SurfaceTimeout,
        wgpu::SurfaceError::Other => DeviceErrorCode::Other,
    }
}

pub(super) fn surface_error(err: &wgpu::SurfaceError) -> DeviceError {
    DeviceError::new(surface_error_code(err), format!("frame acquisition failed: {err}"))
}
