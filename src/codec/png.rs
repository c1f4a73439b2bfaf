//! PNG frame codec
//!
//! Decodes PNG payloads to RGBA and scales them to the requested output
//! size with nearest-neighbor sampling.

use super::{FrameCodec, PixelSurface};
use std::io::Cursor;

/// Stateless PNG decoder implementing the frame-codec capability
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl PngCodec {
    pub fn new() -> Self {
        Self
    }

    /// Decode a PNG payload to tightly packed RGBA at native size
    fn decode_rgba(payload: &[u8]) -> Option<(Vec<u8>, u32, u32)> {
        let decoder = png::Decoder::new(Cursor::new(payload));
        let mut reader = decoder.read_info().ok()?;

        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).ok()?;

        if info.bit_depth != png::BitDepth::Eight {
            return None;
        }

        // Convert to RGBA if needed
        let data = match info.color_type {
            png::ColorType::Rgba => buf[..info.buffer_size()].to_vec(),
            png::ColorType::Rgb => {
                // Add alpha channel
                let rgb = &buf[..info.buffer_size()];
                let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
                for chunk in rgb.chunks(3) {
                    rgba.extend_from_slice(chunk);
                    rgba.push(255);
                }
                rgba
            }
            _ => return None,
        };

        Some((data, info.width, info.height))
    }

    /// Nearest-neighbor scale of an RGBA surface
    fn scale_rgba(
        src: &[u8],
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Vec<u8> {
        let mut dst = vec![0u8; (dst_width as usize) * (dst_height as usize) * 4];

        for dy in 0..dst_height {
            let src_y = ((dy as u64 * src_height as u64) / dst_height as u64) as u32;
            let src_y = src_y.min(src_height - 1);

            for dx in 0..dst_width {
                let src_x = ((dx as u64 * src_width as u64) / dst_width as u64) as u32;
                let src_x = src_x.min(src_width - 1);

                let src_idx = ((src_y * src_width + src_x) * 4) as usize;
                let dst_idx = ((dy * dst_width + dx) * 4) as usize;

                dst[dst_idx..dst_idx + 4].copy_from_slice(&src[src_idx..src_idx + 4]);
            }
        }

        dst
    }
}

impl FrameCodec for PngCodec {
    fn probe(&self, payload: &[u8]) -> Option<(u32, u32)> {
        let decoder = png::Decoder::new(Cursor::new(payload));
        let reader = decoder.read_info().ok()?;
        let info = reader.info();
        Some((info.width, info.height))
    }

    fn decode(
        &self,
        payload: &[u8],
        target_width: u32,
        target_height: u32,
    ) -> Option<PixelSurface> {
        if target_width == 0 || target_height == 0 {
            return None;
        }

        let (native, width, height) = Self::decode_rgba(payload)?;

        let data = if width == target_width && height == target_height {
            native
        } else {
            Self::scale_rgba(&native, width, height, target_width, target_height)
        };

        Some(PixelSurface {
            data,
            width: target_width,
            height: target_height,
        })
    }
}

/// Encode a solid-color RGBA PNG for test input
#[cfg(test)]
pub(crate) fn encode_test_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        writer.write_image_data(&pixels).unwrap();
    }
    out
}
