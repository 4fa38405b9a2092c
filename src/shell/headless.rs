use std::collections::VecDeque;
use std::time::Duration;

use crate::effect::Effect;
use crate::gpu::{MorphologicalAa, RenderDevice, TargetDesc, TextureInfo, WgpuDevice};
use crate::harness::{Command, Event, Harness, ShellRequest};
use crate::image_loader::LogNotifier;
use crate::settings::{HarnessConfig, LaunchOptions};

/// Format of the offscreen presentable target.
pub const PRESENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Frame time reported to the harness, as if refreshing at 60 Hz.
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Frames rendered before giving up on a run that never asks to exit.
const MAX_FRAMES: usize = 10_000;

/// How an offscreen run is set up.
#[derive(Debug, Clone)]
pub struct HeadlessRun {
    pub format: wgpu::TextureFormat,
    pub size: (u32, u32),
    /// Commands injected once the device exists.
    pub commands: Vec<Command>,
    pub max_frames: usize,
}

impl HeadlessRun {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            format: PRESENT_FORMAT,
            size,
            commands: Vec::new(),
            max_frames: MAX_FRAMES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessExit {
    pub code: i32,
    pub frames: usize,
}

/// Runs the harness without a window. Used for single-shot batch renders.
pub fn run(config: HarnessConfig, options: LaunchOptions) -> anyhow::Result<i32> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let mut gpu = pollster::block_on(WgpuDevice::new(&instance, None))?;
    let run = HeadlessRun::new((config.window_width, config.window_height));
    let mut harness: Harness<WgpuDevice, MorphologicalAa> = Harness::new(config, &options, Box::new(LogNotifier));

    let exit = drive(&mut harness, &mut gpu, &run);
    tracing::info!(code = exit.code, frames = exit.frames, "headless run finished");
    Ok(exit.code)
}

/// Feeds events to `harness` until it requests an exit, fails, or
/// `run.max_frames` frames have been rendered.
pub fn drive<D, E>(harness: &mut Harness<D, E>, device: &mut D, run: &HeadlessRun) -> HeadlessExit
where
    D: RenderDevice,
    E: Effect<D>,
{
    let mut frames = 0;
    let exit = |code: i32, frames: usize| HeadlessExit { code, frames };

    let mut queue: VecDeque<ShellRequest> = VecDeque::new();
    queue.push_back(ShellRequest::ResizeSurface {
        width: run.size.0,
        height: run.size.1,
    });
    match harness.handle(device, Event::DeviceCreated) {
        Ok(requests) => queue.extend(requests),
        Err(e) => return exit(e.exit_code(), frames),
    }
    for command in &run.commands {
        match harness.handle(device, Event::Input(command.clone())) {
            Ok(requests) => queue.extend(requests),
            Err(e) => return exit(e.exit_code(), frames),
        }
    }

    let mut present: Option<D::Texture> = None;
    loop {
        while let Some(request) = queue.pop_front() {
            match request {
                ShellRequest::ResizeSurface { width, height } => {
                    if present.as_ref().is_some_and(|p| p.size() == (width, height)) {
                        continue;
                    }
                    if let Err(e) = harness.handle(device, Event::SurfaceReleasing) {
                        return exit(e.exit_code(), frames);
                    }
                    drop(present.take());
                    match device.create_target(&TargetDesc::new("present", width, height, run.format)) {
                        Ok(target) => present = Some(target),
                        Err(e) => {
                            tracing::error!("cannot create offscreen target: {}", e);
                            harness.shutdown();
                            return exit(1, frames);
                        }
                    }
                    let resized = Event::SurfaceResized {
                        width,
                        height,
                        format: run.format,
                    };
                    match harness.handle(device, resized) {
                        Ok(requests) => queue.extend(requests),
                        Err(e) => return exit(e.exit_code(), frames),
                    }
                }
                ShellRequest::SetOverlay(Some(text)) => tracing::debug!("{}", text),
                ShellRequest::SetOverlay(None) => {}
                ShellRequest::Exit(code) => return exit(code, frames),
            }
        }

        if frames >= run.max_frames {
            harness.shutdown();
            return exit(0, frames);
        }
        let Some(target) = present.as_ref() else {
            harness.shutdown();
            return exit(1, frames);
        };

        let frame = Event::RenderFrame {
            present: target,
            elapsed: FRAME_TIME,
        };
        frames += 1;
        match harness.handle(device, frame) {
            Ok(requests) => queue.extend(requests),
            Err(e) => return exit(e.exit_code(), frames),
        }
    }
}
