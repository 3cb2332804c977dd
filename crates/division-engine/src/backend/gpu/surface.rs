use winit::dpi::PhysicalSize;

use crate::error::EngineError;

/// Response to a failed surface acquisition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SurfaceErrorAction {
    /// Surface was reconfigured; the next frame may render.
    Reconfigured,
    /// Transient; skip this frame.
    SkipFrame,
    /// Unrecoverable (out of memory).
    Fatal,
}

impl SurfaceErrorAction {
    pub(crate) fn into_error(self, err: &wgpu::SurfaceError) -> EngineError {
        match self {
            Self::Reconfigured | Self::SkipFrame => EngineError::FrameSkipped(err.to_string()),
            Self::Fatal => EngineError::backend(format!("surface: {err}")),
        }
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if prefer_srgb {
        let srgb = [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8UnormSrgb];
        if let Some(f) = srgb.into_iter().find(|f| caps.formats.contains(f)) {
            return Some(f);
        }
    }
    caps.formats.first().copied()
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Records the new size and reconfigures unless it is zero, which wgpu rejects.
pub(crate) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    size: &mut PhysicalSize<u32>,
    new_size: PhysicalSize<u32>,
) {
    *size = new_size;
    if new_size.width == 0 || new_size.height == 0 {
        return;
    }

    config.width = new_size.width;
    config.height = new_size.height;
    surface.configure(device, config);
}

pub(crate) fn map_surface_error(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    err: &wgpu::SurfaceError,
) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            if size.width > 0 && size.height > 0 {
                surface.configure(device, config);
            }
            SurfaceErrorAction::Reconfigured
        }
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_is_preferred() {
        let c = caps(vec![wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb]);
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&caps(vec![]), true), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let c = caps(vec![wgpu::TextureFormat::Bgra8Unorm]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
    }

    #[test]
    fn only_out_of_memory_is_fatal() {
        let timeout = wgpu::SurfaceError::Timeout;
        assert!(!SurfaceErrorAction::SkipFrame.into_error(&timeout).is_fatal());
        assert!(SurfaceErrorAction::Fatal.into_error(&wgpu::SurfaceError::OutOfMemory).is_fatal());
    }
}
