//! Encoded test assets built in memory.

use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::{Delay, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};

/// GIF with one frame per entry of `delays_ms`. A zero delay is written as "unspecified".
pub fn gif_bytes(delays_ms: &[u32], width: u32, height: u32) -> Vec<u8> {
    let frames: Vec<Frame> = delays_ms
        .iter()
        .enumerate()
        .map(|(i, &ms)| {
            let shade = (i as u8).wrapping_mul(60).wrapping_add(30);
            let buffer = RgbaImage::from_pixel(width, height, Rgba([shade, 0, 255 - shade, 255]));
            Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(ms, 1))
        })
        .collect();

    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.encode_frames(frames).unwrap();
    }
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 128]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
