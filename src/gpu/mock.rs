//! Recording render device used by unit and scenario tests.

use std::cell::Cell;
use std::rc::Rc;

use image::{Rgba, RgbaImage};

use super::types::{DepthImage, RenderDevice, TargetDesc, TextureInfo, Viewport};
use crate::effect::{DetectionMode, Effect, EffectIo, EffectParams};
use crate::errors::GpuError;

#[derive(Debug)]
pub struct MockTexture {
    pub id: usize,
    pub label: String,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    live: Rc<Cell<usize>>,
}

impl Drop for MockTexture {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

impl TextureInfo for MockTexture {
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

#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Upload { label: String, width: u32, height: u32 },
    CreateTarget { label: String, width: u32, height: u32 },
    Alias { target: usize, format: wgpu::TextureFormat },
    Clear { target: usize },
    Copy { source: usize, destination: usize, viewport: Option<Viewport> },
    WaitIdle,
    ReadBack { target: usize },
    EffectRun { mode: DetectionMode, edge_source: usize, output: usize },
}

#[derive(Debug)]
pub struct MockDevice {
    pub ops: Vec<MockOp>,
    pub max_dimension: u32,
    /// Target creation starts failing once this many targets exist.
    pub fail_targets_after: Option<usize>,
    targets_created: usize,
    next_id: usize,
    live: Rc<Cell<usize>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            max_dimension: 8192,
            fail_targets_after: None,
            targets_created: 0,
            next_id: 0,
            live: Rc::new(Cell::new(0)),
        }
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn texture(&mut self, label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> MockTexture {
        self.next_id += 1;
        self.live.set(self.live.get() + 1);
        MockTexture {
            id: self.next_id,
            label: label.to_string(),
            width,
            height,
            format,
            live: self.live.clone(),
        }
    }

    fn check_size(&self, label: &str, width: u32, height: u32) -> Result<(), GpuError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(GpuError::TooLarge {
                label: label.to_string(),
                width,
                height,
                limit: self.max_dimension,
            });
        }
        Ok(())
    }

    /// Stand-in for the swap-chain frame the shell hands over each refresh.
    pub fn present_target(&mut self, width: u32, height: u32) -> MockTexture {
        self.texture("present", width, height, wgpu::TextureFormat::Bgra8UnormSrgb)
    }

    /// Number of textures currently alive.
    pub fn live_textures(&self) -> usize {
        self.live.get()
    }

    pub fn count(&self, predicate: impl Fn(&MockOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }

    pub fn effect_runs(&self) -> Vec<DetectionMode> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                MockOp::EffectRun { mode, .. } => Some(*mode),
                _ => None,
            })
            .collect()
    }
}

impl RenderDevice for MockDevice {
    type Texture = MockTexture;

    fn upload_color(&mut self, label: &str, image: &RgbaImage) -> Result<MockTexture, GpuError> {
        let (width, height) = image.dimensions();
        self.check_size(label, width, height)?;
        self.ops.push(MockOp::Upload {
            label: label.to_string(),
            width,
            height,
        });
        Ok(self.texture(label, width, height, wgpu::TextureFormat::Rgba8UnormSrgb))
    }

    fn upload_depth(&mut self, label: &str, depth: &DepthImage) -> Result<MockTexture, GpuError> {
        let (width, height) = depth.dimensions();
        self.check_size(label, width, height)?;
        self.ops.push(MockOp::Upload {
            label: label.to_string(),
            width,
            height,
        });
        Ok(self.texture(label, width, height, wgpu::TextureFormat::R32Float))
    }

    fn create_target(&mut self, desc: &TargetDesc) -> Result<MockTexture, GpuError> {
        self.check_size(desc.label, desc.width, desc.height)?;
        if self.fail_targets_after.is_some_and(|limit| self.targets_created >= limit) {
            return Err(GpuError::ResourceCreation {
                label: desc.label.to_string(),
                message: "out of memory".to_string(),
            });
        }
        self.targets_created += 1;
        self.ops.push(MockOp::CreateTarget {
            label: desc.label.to_string(),
            width: desc.width,
            height: desc.height,
        });
        Ok(self.texture(desc.label, desc.width, desc.height, desc.format))
    }

    fn create_alias(&mut self, target: &MockTexture, format: wgpu::TextureFormat) -> Result<MockTexture, GpuError> {
        self.ops.push(MockOp::Alias { target: target.id, format });
        let label = format!("{}_alias", target.label);
        Ok(self.texture(&label, target.width, target.height, format))
    }

    fn clear(&mut self, target: &MockTexture) {
        self.ops.push(MockOp::Clear { target: target.id });
    }

    fn copy(&mut self, source: &MockTexture, destination: &MockTexture, viewport: Option<Viewport>) {
        self.ops.push(MockOp::Copy {
            source: source.id,
            destination: destination.id,
            viewport,
        });
    }

    fn wait_idle(&mut self) {
        self.ops.push(MockOp::WaitIdle);
    }

    fn read_back(&mut self, target: &MockTexture) -> Result<RgbaImage, GpuError> {
        self.ops.push(MockOp::ReadBack { target: target.id });
        Ok(RgbaImage::from_pixel(target.width, target.height, Rgba([32, 64, 128, 255])))
    }

    fn describe(&self) -> String {
        String::from("mock device")
    }
}

/// Effect double that records each run on the device.
#[derive(Debug)]
pub struct MockEffect {
    edges: MockTexture,
    weights: MockTexture,
    pub params: Option<EffectParams>,
}

impl Effect<MockDevice> for MockEffect {
    fn create(device: &mut MockDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        let edges = device.create_target(&TargetDesc::new("effect_edges", width, height, wgpu::TextureFormat::Rg8Unorm))?;
        let weights =
            device.create_target(&TargetDesc::new("effect_weights", width, height, wgpu::TextureFormat::Rgba8Unorm))?;
        Ok(Self {
            edges,
            weights,
            params: None,
        })
    }

    fn configure(&mut self, params: &EffectParams) {
        self.params = Some(*params);
    }

    fn run(&mut self, device: &mut MockDevice, mode: DetectionMode, io: &EffectIo<'_, MockTexture>) -> Result<(), GpuError> {
        device.ops.push(MockOp::EffectRun {
            mode,
            edge_source: io.edge_source.id,
            output: io.output.id,
        });
        Ok(())
    }

    fn edges(&self) -> &MockTexture {
        &self.edges
    }

    fn weights(&self) -> &MockTexture {
        &self.weights
    }
}
