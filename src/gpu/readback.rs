use image::RgbaImage;

use super::init::WgpuDevice;
use super::types::{GpuTexture, TextureInfo};
use crate::errors::GpuError;

/// Copies an 8-bit RGBA/BGRA target into host memory. Blocks until the GPU is done.
pub(crate) fn read_rgba(gpu: &WgpuDevice, target: &GpuTexture) -> Result<RgbaImage, GpuError> {
    let swizzle = match target.format() {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        format => {
            return Err(GpuError::UnsupportedFormat {
                operation: "readback",
                format,
            })
        }
    };
    let texture = target.texture.as_ref().ok_or_else(|| GpuError::Readback {
        message: "target is a surface frame".to_string(),
    })?;

    let (width, height) = target.size();
    let unpadded_bytes_per_row = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let buffer_slice = staging.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    // Wait for device to finish
    gpu.device.poll(wgpu::Maintain::Wait);
    pollster::block_on(rx.receive())
        .unwrap_or(Err(wgpu::BufferAsyncError))
        .map_err(|e| GpuError::Readback { message: e.to_string() })?;

    let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    {
        let data = buffer_slice.get_mapped_range();
        for row in data.chunks_exact(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
    }
    staging.unmap();

    if swizzle {
        for pixel in pixels.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }

    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| GpuError::Readback {
        message: "pixel buffer does not match target size".to_string(),
    })
}
