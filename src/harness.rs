use std::path::PathBuf;
use std::time::Duration;

use crate::benchmark::{self, BenchmarkSweep, SweepStatus};
use crate::effect::{DetectionMode, Effect, EffectParams, ViewMode};
use crate::errors::{HarnessError, Result};
use crate::gpu::RenderDevice;
use crate::image_loader::{Catalog, ImageLoader, Notifier};
use crate::pipeline::Pipeline;
use crate::profiler::Profiler;
use crate::settings::{HarnessConfig, LaunchOptions};
use crate::surface::{PresentDesc, SurfaceResources};

/// User intents, already decoded from raw input by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleOverlay,
    PreviousImage,
    NextImage,
    SelectImage(usize),
    OpenImage(PathBuf),
    ToggleProfiling,
    ToggleAntialiasing,
    StartBenchmark,
    SetDetectionMode(DetectionMode),
    SetViewMode(ViewMode),
    CycleViewMode,
    SetMaxSearchSteps(u32),
    SetThreshold(f32),
}

/// Everything the shell reports to the harness.
#[derive(Debug)]
pub enum Event<'a, T> {
    DeviceCreated,
    SurfaceResized {
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    },
    /// The presentable surface is about to go away.
    SurfaceReleasing,
    RenderFrame {
        present: &'a T,
        elapsed: Duration,
    },
    Input(Command),
    DeviceDestroyed,
}

/// What the harness asks of the shell in return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellRequest {
    ResizeSurface { width: u32, height: u32 },
    SetOverlay(Option<String>),
    Exit(i32),
}

/// Frame rate averaged over roughly one second.
#[derive(Debug, Clone, Copy, Default)]
struct FrameStats {
    accumulated: Duration,
    frames: u32,
    fps: f32,
}

impl FrameStats {
    /// Returns true when a new average is available.
    fn record(&mut self, elapsed: Duration) -> bool {
        self.accumulated += elapsed;
        self.frames += 1;
        if self.accumulated < Duration::from_secs(1) {
            return false;
        }
        self.fps = self.frames as f32 / self.accumulated.as_secs_f32();
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        true
    }
}

/// The orchestration context owned by the frame loop.
pub struct Harness<D: RenderDevice, E> {
    config: HarnessConfig,
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
    catalog: Catalog,
    loader: ImageLoader<D::Texture>,
    resources: SurfaceResources<D, E>,
    pipeline: Pipeline,
    profiler: Profiler,
    benchmark: BenchmarkSweep,
    notifier: Box<dyn Notifier>,
    show_overlay: bool,
    overlay: Option<String>,
    stats: FrameStats,
    device_name: String,
    /// Set once a fatal error has torn everything down.
    failed: bool,
}

impl<D: RenderDevice, E: Effect<D>> Harness<D, E> {
    pub fn new(config: HarnessConfig, options: &LaunchOptions, notifier: Box<dyn Notifier>) -> Self {
        let params = EffectParams::new(options.max_search_steps(), options.threshold());
        let mut profiler = Profiler::new();
        profiler.set_repetitions(config.repetitions);

        Self {
            loader: ImageLoader::new(&config.depth_extension),
            config,
            source: options.source.clone(),
            destination: options.destination.clone(),
            catalog: Catalog::default(),
            resources: SurfaceResources::new(),
            pipeline: Pipeline::new(params),
            profiler,
            benchmark: BenchmarkSweep::new(),
            notifier,
            show_overlay: true,
            overlay: None,
            stats: FrameStats::default(),
            device_name: String::new(),
            failed: false,
        }
    }

    /// Replaces the profiler, e.g. to inject a clock.
    pub fn with_profiler(mut self, mut profiler: Profiler) -> Self {
        profiler.set_repetitions(self.config.repetitions);
        self.profiler = profiler;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn loader(&self) -> &ImageLoader<D::Texture> {
        &self.loader
    }

    pub fn resources(&self) -> &SurfaceResources<D, E> {
        &self.resources
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn benchmark(&self) -> &BenchmarkSweep {
        &self.benchmark
    }

    pub fn is_batch(&self) -> bool {
        self.destination.is_some()
    }

    pub fn handle(&mut self, device: &mut D, event: Event<'_, D::Texture>) -> Result<Vec<ShellRequest>> {
        match event {
            Event::DeviceCreated => self.on_device_created(device),
            Event::SurfaceResized { width, height, format } => self.on_resized(device, PresentDesc { width, height, format }),
            Event::SurfaceReleasing => {
                self.resources.release();
                Ok(Vec::new())
            }
            Event::RenderFrame { present, elapsed } => self.on_frame(device, present, elapsed),
            Event::Input(command) => self.on_command(device, command),
            Event::DeviceDestroyed => {
                self.shutdown();
                Ok(Vec::new())
            }
        }
    }

    /// Releases every GPU resource the harness holds.
    pub fn shutdown(&mut self) {
        self.benchmark.abort();
        self.resources.release();
        self.loader.release();
    }

    fn fail(&mut self, error: HarnessError) -> Result<Vec<ShellRequest>> {
        error.log();
        self.shutdown();
        self.failed = true;
        Err(error)
    }

    fn build_catalog(&self) -> Catalog {
        let mut catalog = Catalog::with_folder(&self.config.images_dir, &self.config.image_extension);
        if let Some(source) = &self.source {
            catalog.push_file(source.clone(), true);
        }
        catalog
    }

    fn on_device_created(&mut self, device: &mut D) -> Result<Vec<ShellRequest>> {
        self.device_name = device.describe();
        tracing::info!(device = %self.device_name, "device created");
        self.catalog = self.build_catalog();
        self.reload(device)
    }

    fn on_resized(&mut self, device: &mut D, present: PresentDesc) -> Result<Vec<ShellRequest>> {
        if self.failed {
            tracing::debug!("surface resize ignored after fatal error");
            return Ok(Vec::new());
        }
        if let Err(e) = self.resources.create_or_resize(device, present, self.pipeline.params()) {
            return self.fail(HarnessError::Resources(e));
        }
        self.profiler.reset();
        Ok(self.overlay_request().into_iter().collect())
    }

    /// Loads the selected catalog entry and asks for a surface matching its size.
    fn reload(&mut self, device: &mut D) -> Result<Vec<ShellRequest>> {
        let outcome = match self.loader.load_selected(device, &mut self.catalog, self.notifier.as_mut()) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e.into()),
        };
        self.pipeline.coerce_detection(outcome.has_depth);
        self.profiler.reset();

        let mut requests = Vec::new();
        if self.resources.size() != Some(outcome.size) {
            let (width, height) = outcome.size;
            requests.push(ShellRequest::ResizeSurface { width, height });
        }
        requests.extend(self.overlay_request());
        Ok(requests)
    }

    fn on_frame(&mut self, device: &mut D, present: &D::Texture, elapsed: Duration) -> Result<Vec<ShellRequest>> {
        let Some(group) = self.resources.group_mut() else {
            return Ok(Vec::new());
        };

        let report = match self
            .pipeline
            .render_frame(device, group, self.loader.current(), present, &mut self.profiler)
        {
            Ok(report) => report,
            Err(e) => return self.fail(e.into()),
        };
        tracing::trace!(?report, "frame");

        if let Some(destination) = self.destination.clone() {
            return match self.save_frame(device, present, destination) {
                Ok(()) => {
                    self.shutdown();
                    Ok(vec![ShellRequest::Exit(0)])
                }
                Err(e) => self.fail(e),
            };
        }

        let mut requests = Vec::new();
        if self.benchmark.is_active() {
            let Self {
                benchmark,
                profiler,
                catalog,
                loader,
                notifier,
                ..
            } = self;
            let ticked = benchmark.tick(profiler, |next| {
                if let Some(index) = catalog.position_of(next) {
                    catalog.select(index);
                }
                loader
                    .load_selected(device, catalog, notifier.as_mut())
                    .map(|_| ())
                    .map_err(HarnessError::from)
            });
            match ticked {
                Ok(SweepStatus::Running) => {
                    if let Some(pair) = self.loader.current() {
                        self.pipeline.coerce_detection(pair.has_depth());
                        if self.resources.size() != Some(pair.size()) {
                            let (width, height) = pair.size();
                            requests.push(ShellRequest::ResizeSurface { width, height });
                        }
                    }
                }
                Ok(SweepStatus::Idle) => {}
                Err(HarnessError::Io { source }) => {
                    tracing::warn!("benchmark output failed: {}", source);
                }
                Err(e) => return self.fail(e),
            }
        }

        let fps_updated = self.stats.record(elapsed);
        if fps_updated || self.benchmark.is_active() {
            requests.extend(self.overlay_request());
        }
        Ok(requests)
    }

    fn save_frame(&mut self, device: &mut D, present: &D::Texture, destination: PathBuf) -> Result<()> {
        let image = device.read_back(present)?;
        image
            .save_with_format(&destination, image::ImageFormat::Png)
            .map_err(|e| HarnessError::Export {
                path: destination.clone(),
                message: e.to_string(),
            })?;
        tracing::info!(path = %destination.display(), "frame saved");
        Ok(())
    }

    fn on_command(&mut self, device: &mut D, command: Command) -> Result<Vec<ShellRequest>> {
        tracing::debug!(?command, "command");
        let mut requests = Vec::new();

        match command {
            Command::ToggleOverlay => {
                self.show_overlay = !self.show_overlay;
                if !self.show_overlay {
                    self.overlay = None;
                    return Ok(vec![ShellRequest::SetOverlay(None)]);
                }
            }
            Command::PreviousImage | Command::NextImage | Command::SelectImage(_) if self.benchmark.is_active() => {
                tracing::debug!("navigation ignored while benchmarking");
            }
            Command::PreviousImage => {
                if self.catalog.select_previous() {
                    return self.reload(device);
                }
            }
            Command::NextImage => {
                if self.catalog.select_next() {
                    return self.reload(device);
                }
            }
            Command::SelectImage(index) => {
                if self.catalog.select(index) {
                    return self.reload(device);
                }
            }
            Command::OpenImage(path) => {
                if self.benchmark.is_active() {
                    tracing::debug!("open ignored while benchmarking");
                } else {
                    self.catalog = self.build_catalog();
                    self.catalog.push_file(path, false);
                    return self.reload(device);
                }
            }
            Command::ToggleProfiling => {
                self.profiler.set_enabled(!self.profiler.is_enabled());
                self.profiler.reset();
            }
            Command::ToggleAntialiasing => {
                self.pipeline.set_antialiasing(!self.pipeline.antialiasing());
                self.profiler.reset();
            }
            Command::StartBenchmark => return self.start_benchmark(device),
            Command::SetDetectionMode(mode) => {
                if self.pipeline.set_detection_mode(mode, self.loader.has_depth()) {
                    self.profiler.reset();
                }
            }
            Command::SetViewMode(view) => self.pipeline.set_view_mode(view),
            Command::CycleViewMode => {
                let next = self.pipeline.view_mode().next();
                self.pipeline.set_view_mode(next);
            }
            Command::SetMaxSearchSteps(steps) => {
                if self.pipeline.set_max_search_steps(steps) {
                    self.params_changed();
                }
            }
            Command::SetThreshold(threshold) => {
                if self.pipeline.set_threshold(threshold) {
                    self.params_changed();
                }
            }
        }

        requests.extend(self.overlay_request());
        Ok(requests)
    }

    fn params_changed(&mut self) {
        self.resources.configure_effect(self.pipeline.params());
        self.profiler.reset();
    }

    fn start_benchmark(&mut self, device: &mut D) -> Result<Vec<ShellRequest>> {
        if self.benchmark.is_active() {
            return Ok(Vec::new());
        }
        let sink = match benchmark::open_sink(&self.config.benchmark_path) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!(path = %self.config.benchmark_path.display(), "cannot open benchmark output: {}", e);
                return Ok(Vec::new());
            }
        };
        if !self.benchmark.start(self.catalog.entries().to_vec(), sink) {
            return Ok(Vec::new());
        }
        self.profiler.set_enabled(true);
        self.catalog.select(0);
        self.reload(device)
    }

    /// Text for the overlay, or `None` while it is hidden.
    pub fn overlay_text(&self) -> Option<String> {
        if !self.show_overlay {
            return None;
        }
        let mut parts = Vec::new();
        match self.loader.current() {
            Some(pair) => {
                let (width, height) = pair.size();
                parts.push(format!(
                    "{} [{}/{}] {}x{}",
                    pair.name,
                    self.catalog.position() + 1,
                    self.catalog.len(),
                    width,
                    height
                ));
            }
            None => parts.push("no image".to_string()),
        }
        parts.push(format!("{:.1} fps", self.stats.fps));
        if self.pipeline.antialiasing() {
            let mode = self.pipeline.effective_mode(self.loader.has_depth());
            parts.push(mode.label().to_string());
            parts.push(self.pipeline.view_mode().label().to_string());
        } else {
            parts.push("AA off".to_string());
        }
        let params = self.pipeline.params();
        parts.push(format!("steps {} threshold {:.3}", params.max_search_steps(), params.threshold()));
        if self.profiler.is_enabled() {
            let sections = self.profiler.to_string();
            parts.push(if sections.is_empty() { "profiling".to_string() } else { sections });
        }
        if self.benchmark.is_active() {
            let (index, total) = self.benchmark.progress();
            parts.push(format!("benchmark {}/{}", index + 1, total));
        }
        if !self.device_name.is_empty() {
            parts.push(self.device_name.clone());
        }
        Some(parts.join(" | "))
    }

    /// A `SetOverlay` request if the visible text changed.
    fn overlay_request(&mut self) -> Option<ShellRequest> {
        let text = self.overlay_text();
        if text == self.overlay {
            return None;
        }
        self.overlay = text.clone();
        Some(ShellRequest::SetOverlay(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mock::{MockDevice, MockEffect, MockTexture};
    use crate::image_loader::LogNotifier;

    fn harness(options: LaunchOptions) -> Harness<MockDevice, MockEffect> {
        let config = HarnessConfig {
            images_dir: PathBuf::from("/nonexistent/images"),
            repetitions: 3,
            ..HarnessConfig::default()
        };
        Harness::new(config, &options, Box::new(LogNotifier))
    }

    fn start(harness: &mut Harness<MockDevice, MockEffect>, device: &mut MockDevice) -> MockTexture {
        harness.handle(device, Event::DeviceCreated).unwrap();
        harness
            .handle(
                device,
                Event::SurfaceResized {
                    width: 1280,
                    height: 720,
                    format: wgpu::TextureFormat::Bgra8UnormSrgb,
                },
            )
            .unwrap();
        device.present_target(1280, 720)
    }

    #[test]
    fn test_launch_params_reach_pipeline() {
        let options = LaunchOptions {
            distance: Some(20),
            threshold: Some(0.6),
            ..LaunchOptions::default()
        };
        let harness = harness(options);
        assert_eq!(harness.pipeline().params().max_search_steps(), 16);
        assert_eq!(harness.pipeline().params().threshold(), 0.5);
        assert_eq!(harness.profiler().repetitions(), 3);
    }

    #[test]
    fn test_navigation_reloads_only_on_change() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        start(&mut harness, &mut device);
        assert_eq!(harness.loader().current().unwrap().name, "Scene01.png");

        harness.handle(&mut device, Event::Input(Command::PreviousImage)).unwrap();
        assert_eq!(harness.catalog().position(), 0);

        harness.handle(&mut device, Event::Input(Command::NextImage)).unwrap();
        assert_eq!(harness.loader().current().unwrap().name, "Scene02.png");

        harness.handle(&mut device, Event::Input(Command::SelectImage(99))).unwrap();
        assert_eq!(harness.loader().current().unwrap().name, "Scene07.png");
    }

    #[test]
    fn test_overlay_toggle() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        let requests = harness.handle(&mut device, Event::DeviceCreated).unwrap();
        assert!(requests
            .iter()
            .any(|r| matches!(r, ShellRequest::SetOverlay(Some(text)) if text.starts_with("Scene01.png"))));
        start(&mut harness, &mut device);
        assert!(harness.overlay_text().is_some());

        let requests = harness.handle(&mut device, Event::Input(Command::ToggleOverlay)).unwrap();
        assert_eq!(requests, vec![ShellRequest::SetOverlay(None)]);
        assert!(harness.overlay_text().is_none());

        let requests = harness.handle(&mut device, Event::Input(Command::ToggleOverlay)).unwrap();
        match requests.as_slice() {
            [ShellRequest::SetOverlay(Some(text))] => {
                assert!(text.starts_with("Scene01.png [1/7] 1280x720"));
                assert!(text.contains("mock device"));
            }
            other => panic!("unexpected requests: {:?}", other),
        }
    }

    #[test]
    fn test_depth_selection_follows_source() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        start(&mut harness, &mut device);

        harness
            .handle(&mut device, Event::Input(Command::SetDetectionMode(DetectionMode::Depth)))
            .unwrap();
        assert_eq!(harness.pipeline().detection_mode(), DetectionMode::Luma);

        // Scene03 has depth.
        harness.handle(&mut device, Event::Input(Command::SelectImage(2))).unwrap();
        harness
            .handle(&mut device, Event::Input(Command::SetDetectionMode(DetectionMode::Depth)))
            .unwrap();
        assert_eq!(harness.pipeline().detection_mode(), DetectionMode::Depth);

        harness.handle(&mut device, Event::Input(Command::NextImage)).unwrap();
        assert_eq!(harness.pipeline().detection_mode(), DetectionMode::Depth);
        harness.handle(&mut device, Event::Input(Command::NextImage)).unwrap();
        // Scene05 has none.
        assert_eq!(harness.pipeline().detection_mode(), DetectionMode::Luma);
    }

    #[test]
    fn test_param_change_reaches_effect() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        start(&mut harness, &mut device);

        harness.handle(&mut device, Event::Input(Command::SetThreshold(0.3))).unwrap();
        harness.handle(&mut device, Event::Input(Command::SetMaxSearchSteps(40))).unwrap();
        let group = harness.resources().group().unwrap();
        assert_eq!(group.effect.params, Some(EffectParams::new(40, 0.3)));
    }

    #[test]
    fn test_frame_before_surface_is_skipped() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        harness.handle(&mut device, Event::DeviceCreated).unwrap();
        let present = device.present_target(1280, 720);
        device.ops.clear();

        let requests = harness
            .handle(
                &mut device,
                Event::RenderFrame {
                    present: &present,
                    elapsed: Duration::from_millis(16),
                },
            )
            .unwrap();
        assert!(requests.is_empty());
        assert!(device.ops.is_empty());
    }

    #[test]
    fn test_surface_release_and_shutdown_free_everything() {
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions::default());
        let present = start(&mut harness, &mut device);

        harness.handle(&mut device, Event::SurfaceReleasing).unwrap();
        assert!(!harness.resources().is_ready());

        harness.handle(&mut device, Event::DeviceDestroyed).unwrap();
        assert!(harness.loader().current().is_none());
        drop(present);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_no_surface_group_after_fatal_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("broken.png");
        std::fs::write(&source, b"not an image").unwrap();
        let mut device = MockDevice::new();
        let mut harness = harness(LaunchOptions {
            source: Some(source),
            ..LaunchOptions::default()
        });

        assert!(harness.handle(&mut device, Event::DeviceCreated).is_err());
        let requests = harness
            .handle(
                &mut device,
                Event::SurfaceResized {
                    width: 1280,
                    height: 720,
                    format: wgpu::TextureFormat::Bgra8UnormSrgb,
                },
            )
            .unwrap();
        assert!(requests.is_empty());
        assert!(!harness.resources().is_ready());
        assert_eq!(device.live_textures(), 0);
    }
}
