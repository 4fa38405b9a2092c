use crate::effect::{Effect, EffectParams};
use crate::errors::GpuError;
use crate::gpu::{RenderDevice, TargetDesc, TextureInfo};

/// Working color buffer. Sampled through its linear alias for edge detection.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const LINEAR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

const COLOR_ALIASES: &[wgpu::TextureFormat] = &[LINEAR_FORMAT];

/// The presentable target as the shell describes it. The harness never owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentDesc {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// Every buffer whose size follows the display surface.
pub struct SurfaceGroup<D: RenderDevice, E> {
    pub present: PresentDesc,
    pub depth_stencil: D::Texture,
    pub depth: D::Texture,
    pub color: D::Texture,
    pub color_linear: D::Texture,
    pub effect: E,
}

impl<D: RenderDevice, E: Effect<D>> SurfaceGroup<D, E> {
    fn create(device: &mut D, present: PresentDesc, params: &EffectParams) -> Result<Self, GpuError> {
        let PresentDesc { width, height, .. } = present;

        let depth_stencil = device.create_target(&TargetDesc::new("depth_stencil", width, height, DEPTH_STENCIL_FORMAT))?;
        let depth = device.create_target(&TargetDesc::new("depth", width, height, DEPTH_FORMAT))?;
        let color = device.create_target(&TargetDesc::new("color_srgb", width, height, COLOR_FORMAT).with_aliases(COLOR_ALIASES))?;
        let color_linear = device.create_alias(&color, LINEAR_FORMAT)?;

        let mut effect = E::create(device, width, height)?;
        effect.configure(params);

        Ok(Self {
            present,
            depth_stencil,
            depth,
            color,
            color_linear,
            effect,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.color.size()
    }
}

/// Owner of the surface group. The group is either complete or absent.
pub struct SurfaceResources<D: RenderDevice, E> {
    group: Option<SurfaceGroup<D, E>>,
}

impl<D: RenderDevice, E> Default for SurfaceResources<D, E> {
    fn default() -> Self {
        Self { group: None }
    }
}

impl<D: RenderDevice, E: Effect<D>> SurfaceResources<D, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases the current group, then builds a new one for `present`.
    /// On failure nothing is left allocated.
    pub fn create_or_resize(&mut self, device: &mut D, present: PresentDesc, params: &EffectParams) -> Result<(), GpuError> {
        self.release();
        let group = SurfaceGroup::create(device, present, params)?;
        tracing::info!(width = present.width, height = present.height, format = ?present.format, "surface group created");
        self.group = Some(group);
        Ok(())
    }

    pub fn release(&mut self) {
        if self.group.take().is_some() {
            tracing::debug!("surface group released");
        }
    }

    pub fn group(&self) -> Option<&SurfaceGroup<D, E>> {
        self.group.as_ref()
    }

    pub fn group_mut(&mut self) -> Option<&mut SurfaceGroup<D, E>> {
        self.group.as_mut()
    }

    pub fn is_ready(&self) -> bool {
        self.group.is_some()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.group.as_ref().map(SurfaceGroup::size)
    }

    /// Pushes new tuning to the live effect, if any.
    pub fn configure_effect(&mut self, params: &EffectParams) {
        if let Some(group) = self.group.as_mut() {
            group.effect.configure(params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mock::{MockDevice, MockEffect, MockOp};

    fn present(width: u32, height: u32) -> PresentDesc {
        PresentDesc {
            width,
            height,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
        }
    }

    #[test]
    fn test_group_matches_requested_size() {
        let mut device = MockDevice::new();
        let mut resources = SurfaceResources::<MockDevice, MockEffect>::new();

        for (width, height) in [(1280, 720), (1920, 1080), (640, 480)] {
            resources
                .create_or_resize(&mut device, present(width, height), &EffectParams::default())
                .unwrap();
            let group = resources.group().unwrap();
            assert_eq!(group.depth_stencil.size(), (width, height));
            assert_eq!(group.depth.size(), (width, height));
            assert_eq!(group.color.size(), (width, height));
            assert_eq!(group.color_linear.size(), (width, height));
            assert_eq!(group.effect.edges().size(), (width, height));
            assert_eq!(group.effect.weights().size(), (width, height));
        }

        // Only the last group survives: 4 targets, 1 alias, 2 effect intermediates.
        assert_eq!(device.live_textures(), 6);
    }

    #[test]
    fn test_linear_alias_views_color_target() {
        let mut device = MockDevice::new();
        let mut resources = SurfaceResources::<MockDevice, MockEffect>::new();
        resources.create_or_resize(&mut device, present(800, 600), &EffectParams::default()).unwrap();

        let group = resources.group().unwrap();
        assert_eq!(group.color.format(), COLOR_FORMAT);
        assert_eq!(group.color_linear.format(), LINEAR_FORMAT);
        assert!(device.ops.contains(&MockOp::Alias {
            target: group.color.id,
            format: LINEAR_FORMAT,
        }));
    }

    #[test]
    fn test_failed_resize_leaves_no_partial_group() {
        let mut device = MockDevice::new();
        let mut resources = SurfaceResources::<MockDevice, MockEffect>::new();
        resources.create_or_resize(&mut device, present(1280, 720), &EffectParams::default()).unwrap();

        // The next group fails while creating its effect intermediates.
        device.fail_targets_after = Some(device.count(|op| matches!(op, MockOp::CreateTarget { .. })) + 3);
        let result = resources.create_or_resize(&mut device, present(1920, 1080), &EffectParams::default());

        assert!(result.is_err());
        assert!(resources.group().is_none());
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_oversized_surface_is_rejected() {
        let mut device = MockDevice::new();
        device.max_dimension = 4096;
        let mut resources = SurfaceResources::<MockDevice, MockEffect>::new();
        let err = resources
            .create_or_resize(&mut device, present(8000, 600), &EffectParams::default())
            .unwrap_err();
        assert!(matches!(err, GpuError::TooLarge { .. }));
        assert!(!resources.is_ready());
    }

    #[test]
    fn test_effect_receives_params() {
        let mut device = MockDevice::new();
        let mut resources = SurfaceResources::<MockDevice, MockEffect>::new();
        let params = EffectParams::new(16, 0.2);
        resources.create_or_resize(&mut device, present(64, 64), &params).unwrap();
        assert_eq!(resources.group().unwrap().effect.params, Some(params));

        let params = EffectParams::new(4, 0.05);
        resources.configure_effect(&params);
        assert_eq!(resources.group().unwrap().effect.params, Some(params));

        resources.release();
        assert_eq!(device.live_textures(), 0);
    }
}
