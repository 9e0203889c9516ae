/// Color blending applied by the bound program.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Premultiplied alpha.
    Alpha,
    Additive,
}

/// Depth-test configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DepthState {
    /// Reject fragments behind the stored depth (`Less`).
    pub test: bool,
    pub write: bool,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
    };
    pub const READ_ONLY: Self = Self {
        test: true,
        write: false,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
        }
    }
}

/// Triangle culling. Front faces wind counter-clockwise.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum IndexFormat {
    #[default]
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Linear RGBA clear color.
#[derive(Debug, Copy, Clone, PartialEq, serde::Deserialize)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::rgb(0.45, 0.65, 0.9)
    }
}
