use std::sync::Arc;

use image::RgbaImage;

use super::init::WgpuDevice;
use super::types::{DepthImage, GpuTexture, RenderDevice, TargetDesc, TextureInfo, Viewport};
use crate::errors::GpuError;

impl WgpuDevice {
    fn check_size(&self, label: &str, width: u32, height: u32) -> Result<(), GpuError> {
        let limit = self.max_texture_dimension();
        if width == 0 || height == 0 {
            return Err(GpuError::ResourceCreation {
                label: label.to_string(),
                message: format!("empty extent {}x{}", width, height),
            });
        }
        if width > limit || height > limit {
            return Err(GpuError::TooLarge {
                label: label.to_string(),
                width,
                height,
                limit,
            });
        }
        Ok(())
    }

    fn upload(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        bytes: &[u8],
        bytes_per_pixel: u32,
    ) -> Result<GpuTexture, GpuError> {
        self.check_size(label, width, height)?;

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture::new(Arc::new(texture), view, format))
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }
}

impl RenderDevice for WgpuDevice {
    type Texture = GpuTexture;

    fn upload_color(&mut self, label: &str, image: &RgbaImage) -> Result<GpuTexture, GpuError> {
        let (width, height) = image.dimensions();
        self.upload(label, width, height, wgpu::TextureFormat::Rgba8UnormSrgb, image.as_raw(), 4)
    }

    fn upload_depth(&mut self, label: &str, depth: &DepthImage) -> Result<GpuTexture, GpuError> {
        let (width, height) = depth.dimensions();
        self.upload(
            label,
            width,
            height,
            wgpu::TextureFormat::R32Float,
            bytemuck::cast_slice(depth.as_raw()),
            4,
        )
    }

    fn create_target(&mut self, desc: &TargetDesc) -> Result<GpuTexture, GpuError> {
        self.check_size(desc.label, desc.width, desc.height)?;

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if !desc.format.is_depth_stencil_format() {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: desc.alias_formats,
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        tracing::trace!(label = desc.label, width = desc.width, height = desc.height, "created target");
        Ok(GpuTexture::new(Arc::new(texture), view, desc.format))
    }

    fn create_alias(&mut self, target: &GpuTexture, format: wgpu::TextureFormat) -> Result<GpuTexture, GpuError> {
        let texture = target.texture.clone().ok_or_else(|| GpuError::ResourceCreation {
            label: "alias".to_string(),
            message: "surface frames cannot be aliased".to_string(),
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("alias_view"),
            format: Some(format),
            ..Default::default()
        });
        Ok(GpuTexture::new(texture, view, format))
    }

    fn clear(&mut self, target: &GpuTexture) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("clear_encoder"),
        });
        if target.format().is_depth_stencil_format() {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_depth_stencil"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        } else {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_color"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.submit(encoder);
    }

    fn copy(&mut self, source: &GpuTexture, destination: &GpuTexture, viewport: Option<Viewport>) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("copy_encoder"),
        });
        let viewport = viewport.unwrap_or_else(|| Viewport::full(destination.width(), destination.height()));
        self.copy.encode(&self.device, &mut encoder, source, destination, viewport);
        self.submit(encoder);
    }

    fn wait_idle(&mut self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn read_back(&mut self, target: &GpuTexture) -> Result<RgbaImage, GpuError> {
        super::readback::read_rgba(self, target)
    }

    fn describe(&self) -> String {
        self.adapter_summary().to_string()
    }
}
