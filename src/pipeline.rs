use std::time::Duration;

use crate::effect::{DetectionMode, Effect, EffectIo, EffectParams, ViewMode};
use crate::errors::GpuError;
use crate::gpu::{RenderDevice, Viewport};
use crate::image_loader::SourcePair;
use crate::profiler::Profiler;
use crate::surface::SurfaceGroup;

/// Profiler section the effect passes are recorded under.
pub const EFFECT_SECTION: &str = "effect";

/// What happened during one `render_frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Detection mode the effect ran with, `None` when antialiasing is off.
    pub detection: Option<DetectionMode>,
    pub view: ViewMode,
    pub effect_runs: u32,
    pub sample: Option<Duration>,
}

/// Per-frame pass selection.
#[derive(Debug, Clone)]
pub struct Pipeline {
    antialiasing: bool,
    detection: DetectionMode,
    view: ViewMode,
    params: EffectParams,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(EffectParams::default())
    }
}

impl Pipeline {
    pub fn new(params: EffectParams) -> Self {
        Self {
            antialiasing: true,
            detection: DetectionMode::default(),
            view: ViewMode::default(),
            params,
        }
    }

    pub fn antialiasing(&self) -> bool {
        self.antialiasing
    }

    /// Turning antialiasing off also returns to the final view.
    pub fn set_antialiasing(&mut self, enabled: bool) {
        self.antialiasing = enabled;
        if !enabled {
            self.view = ViewMode::Final;
        }
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detection
    }

    /// Returns false and keeps the current mode if `mode` needs depth the source lacks.
    pub fn set_detection_mode(&mut self, mode: DetectionMode, has_depth: bool) -> bool {
        if !DetectionMode::selectable(has_depth).contains(&mode) {
            tracing::debug!(?mode, "detection mode not available without depth");
            return false;
        }
        self.detection = mode;
        true
    }

    /// The mode the effect actually runs with. A stale depth selection falls back to luma.
    pub fn effective_mode(&self, has_depth: bool) -> DetectionMode {
        if self.detection == DetectionMode::Depth && !has_depth {
            DetectionMode::Luma
        } else {
            self.detection
        }
    }

    /// Drops a depth selection the new source cannot honour.
    pub fn coerce_detection(&mut self, has_depth: bool) {
        self.detection = self.effective_mode(has_depth);
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view
    }

    /// Intermediate views force antialiasing on.
    pub fn set_view_mode(&mut self, view: ViewMode) {
        self.view = view;
        if view.requires_antialiasing() {
            self.antialiasing = true;
        }
    }

    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    /// Returns true if the parameters changed.
    pub fn set_max_search_steps(&mut self, steps: u32) -> bool {
        let before = self.params;
        self.params.set_max_search_steps(steps);
        before != self.params
    }

    pub fn set_threshold(&mut self, threshold: f32) -> bool {
        let before = self.params;
        self.params.set_threshold(threshold);
        before != self.params
    }

    /// Records one frame into `present`.
    pub fn render_frame<D, E>(
        &self,
        device: &mut D,
        group: &mut SurfaceGroup<D, E>,
        source: Option<&SourcePair<D::Texture>>,
        present: &D::Texture,
        profiler: &mut Profiler,
    ) -> Result<FrameReport, GpuError>
    where
        D: RenderDevice,
        E: Effect<D>,
    {
        device.clear(present);
        device.clear(&group.depth_stencil);

        let has_depth = source.is_some_and(SourcePair::has_depth);
        match source {
            Some(pair) => {
                let viewport = Viewport::letterbox(pair.size(), group.size());
                device.copy(&pair.color, &group.color, Some(viewport));
                match &pair.depth {
                    Some(depth) => device.copy(depth, &group.depth, Some(viewport)),
                    None => device.clear(&group.depth),
                }
            }
            None => {
                device.clear(&group.color);
                device.clear(&group.depth);
            }
        }

        let mut report = FrameReport {
            detection: None,
            view: self.view,
            effect_runs: 0,
            sample: None,
        };

        if !self.antialiasing {
            device.copy(&group.color, present, None);
            return Ok(report);
        }

        let mode = self.effective_mode(has_depth);
        let io = EffectIo {
            edge_source: if mode == DetectionMode::Depth { &group.depth } else { &group.color_linear },
            color: &group.color,
            output: present,
            depth_stencil: &group.depth_stencil,
        };

        if profiler.is_enabled() {
            let repetitions = profiler.repetitions();
            profiler.start(|| device.wait_idle());
            for _ in 0..repetitions {
                group.effect.run(device, mode, &io)?;
            }
            report.sample = profiler.stop(EFFECT_SECTION, || device.wait_idle());
            report.effect_runs = repetitions;
        } else {
            group.effect.run(device, mode, &io)?;
            report.effect_runs = 1;
        }
        report.detection = Some(mode);

        match self.view {
            ViewMode::Final => {}
            ViewMode::Edges => device.copy(group.effect.edges(), present, None),
            ViewMode::Weights => device.copy(group.effect.weights(), present, None),
        }

        Ok(report)
    }
}
