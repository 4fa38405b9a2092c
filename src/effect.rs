use crate::errors::GpuError;
use crate::gpu::RenderDevice;

/// Upper bound of the effect's internal search-step scale.
pub const MAX_SEARCH_STEPS_LIMIT: u32 = 98;
/// Upper bound of the edge detection threshold.
pub const THRESHOLD_LIMIT: f32 = 0.5;
/// Number of positions of the search-step and threshold sliders.
pub const SLIDER_RANGE: u32 = 100;

pub const DEFAULT_MAX_SEARCH_STEPS: u32 = 8;
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Which signal the effect uses to find edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DetectionMode {
    #[default]
    Luma,
    Color,
    Depth,
}

impl DetectionMode {
    pub const ALL: [DetectionMode; 3] = [DetectionMode::Luma, DetectionMode::Color, DetectionMode::Depth];

    pub fn label(&self) -> &'static str {
        match self {
            DetectionMode::Luma => "Luma edge det.",
            DetectionMode::Color => "Color edge det.",
            DetectionMode::Depth => "Depth edge det.",
        }
    }

    /// Modes that can be selected for a source with or without a depth texture.
    pub fn selectable(has_depth: bool) -> &'static [DetectionMode] {
        if has_depth {
            &Self::ALL
        } else {
            &Self::ALL[..2]
        }
    }
}

/// Which buffer is composited onto the presentable target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Final,
    Edges,
    Weights,
}

impl ViewMode {
    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Final => "View image",
            ViewMode::Edges => "View edges",
            ViewMode::Weights => "View weights",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ViewMode::Final => ViewMode::Edges,
            ViewMode::Edges => ViewMode::Weights,
            ViewMode::Weights => ViewMode::Final,
        }
    }

    /// Intermediate views only exist while the effect runs.
    pub fn requires_antialiasing(&self) -> bool {
        !matches!(self, ViewMode::Final)
    }
}

/// Tuning consumed by the effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    max_search_steps: u32,
    threshold: f32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEARCH_STEPS, DEFAULT_THRESHOLD)
    }
}

impl EffectParams {
    pub fn new(max_search_steps: u32, threshold: f32) -> Self {
        let mut params = Self {
            max_search_steps: 0,
            threshold: 0.0,
        };
        params.set_max_search_steps(max_search_steps);
        params.set_threshold(threshold);
        params
    }

    pub fn max_search_steps(&self) -> u32 {
        self.max_search_steps
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_max_search_steps(&mut self, steps: u32) {
        self.max_search_steps = steps.min(MAX_SEARCH_STEPS_LIMIT);
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = clamp_threshold(threshold);
    }

    pub fn steps_from_slider(position: u32) -> u32 {
        let scale = position.min(SLIDER_RANGE) as f32 / SLIDER_RANGE as f32;
        (scale * MAX_SEARCH_STEPS_LIMIT as f32).round() as u32
    }

    pub fn slider_from_steps(steps: u32) -> u32 {
        (SLIDER_RANGE as f32 * steps.min(MAX_SEARCH_STEPS_LIMIT) as f32 / MAX_SEARCH_STEPS_LIMIT as f32) as u32
    }

    pub fn threshold_from_slider(position: u32) -> f32 {
        position.min(SLIDER_RANGE) as f32 / SLIDER_RANGE as f32 * THRESHOLD_LIMIT
    }

    pub fn slider_from_threshold(threshold: f32) -> u32 {
        (SLIDER_RANGE as f32 * clamp_threshold(threshold) / THRESHOLD_LIMIT).round() as u32
    }
}

/// Clamps to `[0, THRESHOLD_LIMIT]`; NaN becomes the default threshold.
pub fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        DEFAULT_THRESHOLD
    } else {
        threshold.clamp(0.0, THRESHOLD_LIMIT)
    }
}

/// Buffers handed to one effect run.
pub struct EffectIo<'a, T> {
    /// Linear color for luma/color detection, the depth target for depth detection.
    pub edge_source: &'a T,
    /// sRGB color the blending pass reads.
    pub color: &'a T,
    /// Where the antialiased image is written.
    pub output: &'a T,
    pub depth_stencil: &'a T,
}

/// The multi-pass antialiasing effect.
///
/// An effect is created for one surface size and lives exactly as long as the
/// surface group that owns it, so `run` always receives buffers from that group.
pub trait Effect<D: RenderDevice>: Sized {
    fn create(device: &mut D, width: u32, height: u32) -> Result<Self, GpuError>;

    fn configure(&mut self, params: &EffectParams);

    fn run(&mut self, device: &mut D, mode: DetectionMode, io: &EffectIo<'_, D::Texture>) -> Result<(), GpuError>;

    fn edges(&self) -> &D::Texture;

    fn weights(&self) -> &D::Texture;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_only_selectable_with_depth() {
        assert!(!DetectionMode::selectable(false).contains(&DetectionMode::Depth));
        assert!(DetectionMode::selectable(true).contains(&DetectionMode::Depth));
    }

    #[test]
    fn test_params_are_clamped() {
        let params = EffectParams::new(500, 3.0);
        assert_eq!(params.max_search_steps(), MAX_SEARCH_STEPS_LIMIT);
        assert_eq!(params.threshold(), THRESHOLD_LIMIT);

        let params = EffectParams::new(4, -1.0);
        assert_eq!(params.threshold(), 0.0);
        assert_eq!(EffectParams::new(4, f32::NAN).threshold(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_slider_conversion() {
        assert_eq!(EffectParams::steps_from_slider(0), 0);
        assert_eq!(EffectParams::steps_from_slider(100), 98);
        assert_eq!(EffectParams::steps_from_slider(250), 98);
        assert_eq!(EffectParams::slider_from_steps(98), 100);
        assert_eq!(EffectParams::threshold_from_slider(100), 0.5);
        assert_eq!(EffectParams::slider_from_threshold(0.25), 50);
    }

    #[test]
    fn test_view_mode_cycle() {
        assert_eq!(ViewMode::Final.next().next().next(), ViewMode::Final);
        assert!(ViewMode::Edges.requires_antialiasing());
        assert!(!ViewMode::Final.requires_antialiasing());
    }
}
