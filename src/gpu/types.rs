use std::sync::Arc;

use image::{ImageBuffer, Luma, RgbaImage};

use crate::errors::GpuError;

/// Single-channel 32-bit float depth image, as decoded from a companion file.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Dimensions and format every texture handle exposes.
pub trait TextureInfo {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// Description of a render target owned by the surface resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    /// Additional formats the target may later be viewed as.
    pub alias_formats: &'static [wgpu::TextureFormat],
}

impl TargetDesc {
    pub fn new(label: &'static str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width,
            height,
            format,
            sample_count: 1,
            alias_formats: &[],
        }
    }

    pub fn with_aliases(mut self, formats: &'static [wgpu::TextureFormat]) -> Self {
        self.alias_formats = formats;
        self
    }
}

/// Destination rectangle of a copy, in target pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Largest rectangle with the source's aspect ratio that fits the
    /// destination, centred on both axes.
    pub fn letterbox(source: (u32, u32), destination: (u32, u32)) -> Self {
        let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
        let (dw, dh) = (destination.0 as f32, destination.1 as f32);
        let scale = (dw / sw).min(dh / sh);
        let width = (sw * scale).round().min(dw);
        let height = (sh * scale).round().min(dh);
        Self {
            x: ((dw - width) / 2.0).floor(),
            y: ((dh - height) / 2.0).floor(),
            width,
            height,
        }
    }
}

/// The render-device seam between the harness and the GPU.
///
/// Every operation is submitted immediately and returns without waiting for
/// the GPU, except `wait_idle` and `read_back`.
pub trait RenderDevice {
    type Texture: TextureInfo;

    /// Uploads an 8-bit sRGB color image.
    fn upload_color(&mut self, label: &str, image: &RgbaImage) -> Result<Self::Texture, GpuError>;

    /// Uploads a 32-bit float depth image.
    fn upload_depth(&mut self, label: &str, depth: &DepthImage) -> Result<Self::Texture, GpuError>;

    fn create_target(&mut self, desc: &TargetDesc) -> Result<Self::Texture, GpuError>;

    /// A second handle onto `target`'s storage, viewed as `format`.
    fn create_alias(
        &mut self,
        target: &Self::Texture,
        format: wgpu::TextureFormat,
    ) -> Result<Self::Texture, GpuError>;

    /// Clears a color target to transparent black, or a depth/stencil target to (1.0, 0).
    fn clear(&mut self, target: &Self::Texture);

    /// Draws `source` into `destination`. With a viewport the rest of the
    /// destination is cleared; without one the source covers it entirely.
    fn copy(&mut self, source: &Self::Texture, destination: &Self::Texture, viewport: Option<Viewport>);

    /// Blocks until all submitted work has finished executing.
    fn wait_idle(&mut self);

    fn read_back(&mut self, target: &Self::Texture) -> Result<RgbaImage, GpuError>;

    fn describe(&self) -> String {
        String::from("unknown device")
    }
}

/// wgpu texture plus the view used both to render into and to sample from it.
#[derive(Debug)]
pub struct GpuTexture {
    pub(crate) texture: Option<Arc<wgpu::Texture>>,
    pub(crate) view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl GpuTexture {
    pub(crate) fn new(texture: Arc<wgpu::Texture>, view: wgpu::TextureView, format: wgpu::TextureFormat) -> Self {
        Self {
            width: texture.width(),
            height: texture.height(),
            texture: Some(texture),
            view,
            format,
        }
    }

    /// Wraps a swap-chain frame. The frame stays owned by the surface, so the
    /// handle can be rendered to but not read back.
    pub fn from_surface_texture(frame: &wgpu::SurfaceTexture) -> Self {
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture: None,
            view,
            width: frame.texture.width(),
            height: frame.texture.height(),
            format: frame.texture.format(),
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl TextureInfo for GpuTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}
