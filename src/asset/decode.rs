use std::io::Cursor;

use glam::UVec2;
use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, ImageFormat, ImageResult, RgbaImage};

use super::timing;
use super::AnimFrame;

/// Decode every GIF frame into premultiplied RGBA8, fitted into `fit` if given.
pub fn decode_gif(bytes: &[u8], fit: Option<UVec2>) -> ImageResult<Vec<AnimFrame>> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let frames = decoder.into_frames().collect_frames()?;

    Ok(frames
        .into_iter()
        .map(|frame| {
            let delay_ms = timing::frame_interval(frame.delay());
            AnimFrame {
                image: prepare(frame.into_buffer(), fit),
                delay_ms,
            }
        })
        .collect())
}

/// Decode a PNG into premultiplied RGBA8, fitted into `fit` if given.
pub fn decode_png(bytes: &[u8], fit: Option<UVec2>) -> ImageResult<RgbaImage> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(prepare(img.to_rgba8(), fit))
}

fn prepare(mut rgba: RgbaImage, fit: Option<UVec2>) -> RgbaImage {
    premultiply_rgba8_in_place(&mut rgba);
    match fit {
        Some(target) => fit_within(&rgba, target),
        None => rgba,
    }
}

/// Largest size with the source aspect ratio that fits inside `target`.
pub fn fitted_size(src: UVec2, target: UVec2) -> UVec2 {
    if src.x == 0 || src.y == 0 {
        return src;
    }
    let scale = (target.x as f32 / src.x as f32).min(target.y as f32 / src.y as f32);
    UVec2::new(
        ((src.x as f32 * scale).round() as u32).max(1),
        ((src.y as f32 * scale).round() as u32).max(1),
    )
}

fn fit_within(rgba: &RgbaImage, target: UVec2) -> RgbaImage {
    let src = UVec2::from(rgba.dimensions());
    let size = fitted_size(src, target);
    if size == src {
        return rgba.clone();
    }
    // Resampling premultiplied pixels keeps transparent edges free of fringes.
    imageops::resize(rgba, size.x, size.y, FilterType::Triangle)
}

fn premultiply_rgba8_in_place(rgba: &mut RgbaImage) {
    for px in rgba.pixels_mut() {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}
