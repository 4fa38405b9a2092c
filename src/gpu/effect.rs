use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::init::WgpuDevice;
use super::types::{GpuTexture, RenderDevice, TargetDesc, TextureInfo};
use crate::effect::{DetectionMode, Effect, EffectIo, EffectParams};
use crate::errors::GpuError;

pub const EDGES_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg8Unorm;
pub const WEIGHTS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Depth discontinuities are judged against a tenth of the color threshold.
const DEPTH_THRESHOLD_SCALE: f32 = 0.1;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct EffectUniforms {
    threshold: f32,
    max_search_steps: u32,
    depth_threshold: f32,
    _pad: u32,
}

impl From<&EffectParams> for EffectUniforms {
    fn from(params: &EffectParams) -> Self {
        Self {
            threshold: params.threshold(),
            max_search_steps: params.max_search_steps(),
            depth_threshold: params.threshold() * DEPTH_THRESHOLD_SCALE,
            _pad: 0,
        }
    }
}

/// Reference three-pass morphological antialiasing effect.
#[derive(Debug)]
pub struct MorphologicalAa {
    edges: GpuTexture,
    weights: GpuTexture,
    uniforms: wgpu::Buffer,
    pending: Option<EffectUniforms>,
    shader: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    edge_pipelines: HashMap<DetectionMode, wgpu::RenderPipeline>,
    weight_pipeline: wgpu::RenderPipeline,
    blend_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    // Inputs come from the owning surface group and stay fixed for this effect's lifetime.
    edge_bind_groups: HashMap<DetectionMode, wgpu::BindGroup>,
    weight_bind_group: wgpu::BindGroup,
    blend_bind_group: Option<wgpu::BindGroup>,
}

fn stencil_face(compare: wgpu::CompareFunction, pass_op: wgpu::StencilOperation) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    }
}

fn stencil_state(compare: wgpu::CompareFunction, pass_op: wgpu::StencilOperation) -> wgpu::DepthStencilState {
    let face = stencil_face(compare, pass_op);
    wgpu::DepthStencilState {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask: 0xff,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

fn create_pass_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    format: wgpu::TextureFormat,
    depth_stencil: Option<wgpu::DepthStencilState>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(entry_point),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl MorphologicalAa {
    fn bind_group(&self, device: &wgpu::Device, label: &str, input0: &GpuTexture, input1: &GpuTexture) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input0.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input1.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniforms.as_entire_binding(),
                },
            ],
        })
    }

    fn edge_entry_point(mode: DetectionMode) -> &'static str {
        match mode {
            DetectionMode::Luma => "fs_edges_luma",
            DetectionMode::Color => "fs_edges_color",
            DetectionMode::Depth => "fs_edges_depth",
        }
    }
}

impl Effect<WgpuDevice> for MorphologicalAa {
    fn create(gpu: &mut WgpuDevice, width: u32, height: u32) -> Result<Self, GpuError> {
        let edges = gpu.create_target(&TargetDesc::new("effect_edges", width, height, EDGES_FORMAT))?;
        let weights = gpu.create_target(&TargetDesc::new("effect_weights", width, height, WEIGHTS_FORMAT))?;
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("effect_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/effect.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect_bind_group_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect_params"),
            contents: bytemuck::bytes_of(&EffectUniforms::from(&EffectParams::default())),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let edge_pipelines = DetectionMode::ALL
            .iter()
            .map(|&mode| {
                let pipeline = create_pass_pipeline(
                    device,
                    &pipeline_layout,
                    &shader,
                    Self::edge_entry_point(mode),
                    EDGES_FORMAT,
                    Some(stencil_state(wgpu::CompareFunction::Always, wgpu::StencilOperation::Replace)),
                );
                (mode, pipeline)
            })
            .collect();

        let weight_pipeline = create_pass_pipeline(
            device,
            &pipeline_layout,
            &shader,
            "fs_weights",
            WEIGHTS_FORMAT,
            Some(stencil_state(wgpu::CompareFunction::Equal, wgpu::StencilOperation::Keep)),
        );

        let weight_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("effect_weights_bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(edges.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(edges.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });

        tracing::debug!(width, height, "morphological effect created");

        Ok(Self {
            edges,
            weights,
            uniforms,
            pending: None,
            shader,
            layout,
            pipeline_layout,
            edge_pipelines,
            weight_pipeline,
            blend_pipelines: HashMap::new(),
            edge_bind_groups: HashMap::new(),
            weight_bind_group,
            blend_bind_group: None,
        })
    }

    fn configure(&mut self, params: &EffectParams) {
        self.pending = Some(EffectUniforms::from(params));
    }

    fn run(&mut self, gpu: &mut WgpuDevice, mode: DetectionMode, io: &EffectIo<'_, GpuTexture>) -> Result<(), GpuError> {
        if let Some(uniforms) = self.pending.take() {
            gpu.queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
        }

        if !self.edge_bind_groups.contains_key(&mode) {
            let bind_group = self.bind_group(&gpu.device, "effect_edges_bind_group", io.edge_source, io.edge_source);
            self.edge_bind_groups.insert(mode, bind_group);
        }
        if self.blend_bind_group.is_none() {
            self.blend_bind_group = Some(self.bind_group(&gpu.device, "effect_blend_bind_group", io.color, &self.weights));
        }
        let output_format = io.output.format();
        if !self.blend_pipelines.contains_key(&output_format) {
            let pipeline = create_pass_pipeline(&gpu.device, &self.pipeline_layout, &self.shader, "fs_blend", output_format, None);
            self.blend_pipelines.insert(output_format, pipeline);
        }

        let (Some(edge_pipeline), Some(edge_bind_group), Some(blend_pipeline), Some(blend_bind_group)) = (
            self.edge_pipelines.get(&mode),
            self.edge_bind_groups.get(&mode),
            self.blend_pipelines.get(&output_format),
            self.blend_bind_group.as_ref(),
        ) else {
            return Err(GpuError::ResourceCreation {
                label: "effect".to_string(),
                message: format!("missing pipeline state for {:?}", mode),
            });
        };

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("effect_encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect_edges_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.edges.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: io.depth_stencil.view(),
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(edge_pipeline);
            rpass.set_bind_group(0, edge_bind_group, &[]);
            rpass.set_stencil_reference(1);
            rpass.draw(0..3, 0..1);
        }

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect_weights_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.weights.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: io.depth_stencil.view(),
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.weight_pipeline);
            rpass.set_bind_group(0, &self.weight_bind_group, &[]);
            rpass.set_stencil_reference(1);
            rpass.draw(0..3, 0..1);
        }

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect_blend_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: io.output.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(blend_pipeline);
            rpass.set_bind_group(0, blend_bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn edges(&self) -> &GpuTexture {
        &self.edges
    }

    fn weights(&self) -> &GpuTexture {
        &self.weights
    }
}
