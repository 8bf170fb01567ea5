//! GPU to CPU texture readback

/// Reads an `Rgba8Unorm` texture back into an RGBA8 image
///
/// # Arguments
/// * `device` - The wgpu device owning the texture
/// * `queue` - The queue to submit the copy on
/// * `texture` - The texture to read; must have `COPY_SRC` usage
///
/// # Returns
/// The image with row padding removed
pub fn read_rgba8_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<image::RgbaImage, Box<dyn std::error::Error>> {
    let format = texture.format();
    if format != wgpu::TextureFormat::Rgba8Unorm {
        return Err(format!("Unsupported texture format for readback: {format:?}").into());
    }
    let wgpu::Extent3d { width, height, .. } = texture.size();

    let unpadded_bytes_per_row = width * 4;
    let bytes_per_row = padded_bytes_per_row(unpadded_bytes_per_row);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only disappears if the caller already gave up
        let _ = sender.send(result);
    });

    device.poll(wgpu::PollType::Wait)?;
    pollster::block_on(receiver.receive()).ok_or("Failed to map buffer for reading")??;

    let data = buffer_slice.get_mapped_range();
    let pixels = strip_row_padding(&data, unpadded_bytes_per_row as usize, bytes_per_row as usize, height as usize);
    drop(data);
    buffer.unmap();

    image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| "Failed to create RGBA8 image from data".into())
}

/// Rounds a row size up to the copy alignment wgpu requires
fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn strip_row_padding(data: &[u8], row_bytes: usize, padded_row_bytes: usize, rows: usize) -> Vec<u8> {
    data.chunks(padded_row_bytes).take(rows).flat_map(|row| &row[..row_bytes.min(row.len())]).copied().collect()
}
