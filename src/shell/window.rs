use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use super::TITLE;
use crate::effect::{DetectionMode, EffectParams};
use crate::errors::HarnessError;
use crate::gpu::{GpuTexture, MorphologicalAa, WgpuDevice};
use crate::harness::{Command, Event, Harness, ShellRequest};
use crate::image_loader::Notifier;
use crate::settings::{HarnessConfig, LaunchOptions};

/// Shows load failures in a blocking message box.
#[derive(Debug, Default)]
pub struct DialogNotifier;

impl Notifier for DialogNotifier {
    fn notify_error(&mut self, title: &str, message: &str) {
        tracing::error!("{}: {}", title, message);
        let _ = rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title(title)
            .set_description(message)
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
}

fn pick_image() -> Option<Command> {
    rfd::FileDialog::new()
        .add_filter("Images", &["png", "jpg", "jpeg", "bmp"])
        .pick_file()
        .map(Command::OpenImage)
}

/// Maps a key press to a harness command. Arrow keys step the current tuning.
pub fn command_for_key(key: KeyCode, params: &EffectParams) -> Option<Command> {
    let command = match key {
        KeyCode::Tab => Command::ToggleOverlay,
        KeyCode::KeyA => Command::PreviousImage,
        KeyCode::KeyD => Command::NextImage,
        KeyCode::KeyX => Command::ToggleProfiling,
        KeyCode::KeyZ => Command::ToggleAntialiasing,
        KeyCode::KeyP => Command::StartBenchmark,
        KeyCode::Digit1 => Command::SetDetectionMode(DetectionMode::Luma),
        KeyCode::Digit2 => Command::SetDetectionMode(DetectionMode::Color),
        KeyCode::Digit3 => Command::SetDetectionMode(DetectionMode::Depth),
        KeyCode::KeyV => Command::CycleViewMode,
        KeyCode::ArrowUp => Command::SetMaxSearchSteps(params.max_search_steps() + 1),
        KeyCode::ArrowDown => Command::SetMaxSearchSteps(params.max_search_steps().saturating_sub(1)),
        KeyCode::ArrowRight => {
            let position = EffectParams::slider_from_threshold(params.threshold());
            Command::SetThreshold(EffectParams::threshold_from_slider(position + 1))
        }
        KeyCode::ArrowLeft => {
            let position = EffectParams::slider_from_threshold(params.threshold());
            Command::SetThreshold(EffectParams::threshold_from_slider(position.saturating_sub(1)))
        }
        _ => return None,
    };
    Some(command)
}

struct WindowShell {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    gpu: WgpuDevice,
    harness: Harness<WgpuDevice, MorphologicalAa>,
    last_frame: Instant,
    exit_code: Option<i32>,
}

impl WindowShell {
    fn dispatch(&mut self, event: Event<'_, GpuTexture>) -> Vec<ShellRequest> {
        match self.harness.handle(&mut self.gpu, event) {
            Ok(requests) => requests,
            Err(e) => {
                self.exit_code = Some(e.exit_code());
                Vec::new()
            }
        }
    }

    fn apply(&mut self, requests: Vec<ShellRequest>) {
        for request in requests {
            match request {
                ShellRequest::ResizeSurface { width, height } => {
                    if let Some(size) = self.window.request_inner_size(PhysicalSize::new(width, height)) {
                        self.resize(size);
                    }
                }
                ShellRequest::SetOverlay(text) => {
                    self.window.set_title(text.as_deref().unwrap_or(TITLE));
                }
                ShellRequest::Exit(code) => self.exit_code = Some(code),
            }
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if size.width == self.surface_config.width && size.height == self.surface_config.height {
            return;
        }
        let requests = self.dispatch(Event::SurfaceReleasing);
        self.apply(requests);

        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(&self.gpu.device, &self.surface_config);

        let requests = self.dispatch(Event::SurfaceResized {
            width: size.width,
            height: size.height,
            format: self.surface_config.format,
        });
        self.apply(requests);
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.gpu.device, &self.surface_config);
    }

    fn render(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.reconfigure();
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                HarnessError::Gpu(crate::errors::GpuError::ResourceCreation {
                    label: "surface".to_string(),
                    message: "out of memory".to_string(),
                })
                .log();
                self.exit_code = Some(1);
                return;
            }
            Err(e) => {
                tracing::warn!("surface frame unavailable: {}", e);
                return;
            }
        };

        let now = Instant::now();
        let elapsed = now - self.last_frame;
        self.last_frame = now;

        let present = GpuTexture::from_surface_texture(&frame);
        let requests = self.dispatch(Event::RenderFrame {
            present: &present,
            elapsed,
        });
        drop(present);
        frame.present();
        self.apply(requests);
    }

    fn on_key(&mut self, key: KeyCode) {
        if key == KeyCode::Escape {
            self.exit_code.get_or_insert(0);
            return;
        }
        let command = if key == KeyCode::KeyO {
            pick_image()
        } else {
            command_for_key(key, self.harness.pipeline().params())
        };
        if let Some(command) = command {
            let requests = self.dispatch(Event::Input(command));
            self.apply(requests);
        }
    }

    fn shutdown(&mut self) {
        let _ = self.harness.handle(&mut self.gpu, Event::DeviceDestroyed);
    }
}

/// Opens the interactive window and runs until the user quits or a fatal error occurs.
pub fn run(config: HarnessConfig, options: LaunchOptions) -> anyhow::Result<i32> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(config.window_width, config.window_height))
            .build(&event_loop)?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(Arc::clone(&window))
        .context("Failed to create window surface")?;
    let gpu = pollster::block_on(WgpuDevice::new(&instance, Some(&surface)))?;

    let caps = surface.get_capabilities(gpu.adapter());
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;
    let size = window.inner_size();
    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        },
        desired_maximum_frame_latency: 2,
        alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
    };
    surface.configure(&gpu.device, &surface_config);
    tracing::info!(?format, width = surface_config.width, height = surface_config.height, "surface configured");

    let harness = Harness::new(config, &options, Box::new(DialogNotifier));
    let mut shell = WindowShell {
        window,
        surface,
        surface_config,
        gpu,
        harness,
        last_frame: Instant::now(),
        exit_code: None,
    };

    let requests = shell.dispatch(Event::DeviceCreated);
    shell.apply(requests);
    if shell.exit_code.is_none() {
        let requests = shell.dispatch(Event::SurfaceResized {
            width: shell.surface_config.width,
            height: shell.surface_config.height,
            format,
        });
        shell.apply(requests);
    }

    let mut final_code = 0;
    event_loop.run(|event, elwt: &EventLoopWindowTarget<()>| {
        if let Some(code) = shell.exit_code {
            final_code = code;
            shell.shutdown();
            elwt.exit();
            return;
        }

        match event {
            WinitEvent::WindowEvent { event, window_id } if window_id == shell.window.id() => match event {
                WindowEvent::CloseRequested => {
                    shell.exit_code.get_or_insert(0);
                }
                WindowEvent::Resized(size) => shell.resize(size),
                WindowEvent::KeyboardInput { event: key_event, .. } => {
                    if key_event.state == ElementState::Pressed && !key_event.repeat {
                        if let PhysicalKey::Code(key) = key_event.physical_key {
                            shell.on_key(key);
                        }
                    }
                }
                WindowEvent::RedrawRequested => shell.render(),
                _ => {}
            },
            WinitEvent::AboutToWait => shell.window.request_redraw(),
            WinitEvent::LoopExiting => shell.shutdown(),
            _ => {}
        }
    })?;

    Ok(final_code)
}
