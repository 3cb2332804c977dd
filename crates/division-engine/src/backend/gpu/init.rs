/// Native graphics API the wgpu backend runs on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum GraphicsApi {
    /// Let wgpu pick the best available API.
    #[default]
    Auto,
    OpenGl,
    Metal,
}

impl GraphicsApi {
    pub fn backends(self) -> wgpu::Backends {
        match self {
            Self::Auto => wgpu::Backends::all(),
            Self::OpenGl => wgpu::Backends::GL,
            Self::Metal => wgpu::Backends::METAL,
        }
    }
}

/// Initialization parameters for the wgpu backend.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub api: GraphicsApi,

    pub power_preference: wgpu::PowerPreference,

    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// FIFO is supported everywhere and paces presentation to the display.
    pub present_mode: wgpu::PresentMode,

    /// Used when the surface supports it; otherwise the first supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Features the device must have. 64-bit vertex attributes are enabled
    /// on top of these whenever the adapter offers them.
    pub required_features: wgpu::Features,

    /// `None` requests whatever the adapter supports.
    pub required_limits: Option<wgpu::Limits>,

    /// Hint; support depends on platform.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            api: GraphicsApi::Auto,
            power_preference: wgpu::PowerPreference::HighPerformance,
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: None,
            desired_maximum_frame_latency: 2,
        }
    }
}
