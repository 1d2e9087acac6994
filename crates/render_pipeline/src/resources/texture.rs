//! Texture resources
//!
//! Decoding happens upstream; a texture load carries raw pixels, or nothing
//! at all for render targets such as shadow maps.

use super::{Handle, Resource, ResourceId};
use std::fmt;

/// Texture resource marker
#[derive(Debug)]
pub enum Texture {}

impl Resource for Texture {
    type Desc = TextureDesc;
    type Data = TextureData;
    const NAME: &'static str = "texture";
}

/// Reference to a GPU texture
pub type TextureId = ResourceId<Texture>;

/// Owning texture handle
pub type RenderTexture = Handle<Texture>;

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA
    #[default]
    Rgba8,
    /// 8-bit RGB
    Rgb8,
    /// 32-bit float depth, used for shadow maps
    Depth32,
}

impl TextureFormat {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Depth32 => 4,
            Self::Rgb8 => 3,
        }
    }
}

/// Immutable description of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Whether the texture can be bound as a render target
    pub render_target: bool,
}

impl TextureDesc {
    /// Sampled texture description
    pub const fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            render_target: false,
        }
    }

    /// Render target description
    pub const fn render_target(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            render_target: true,
        }
    }

    /// Size of a full mip level in bytes
    pub const fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Pixel payload of a texture load
#[derive(Clone, Default)]
pub struct TextureData {
    /// Decoded pixels, `None` for render targets
    pub pixels: Option<Vec<u8>>,
}

impl TextureData {
    /// Texture initialised from decoded pixels
    pub const fn from_pixels(pixels: Vec<u8>) -> Self {
        Self { pixels: Some(pixels) }
    }

    /// Texture with uninitialised contents
    pub const fn empty() -> Self {
        Self { pixels: None }
    }
}

impl fmt::Debug for TextureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureData")
            .field("pixel_bytes", &self.pixels.as_ref().map(Vec::len))
            .finish()
    }
}
