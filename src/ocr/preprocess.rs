use image::{DynamicImage, GrayImage, Luma};

/// Upscaled width tesseract still handles comfortably.
const MAX_SCALED_WIDTH: u32 = 6000;
const MAX_SCALE: u32 = 3;

/// Largest integer upscale (at most 3) that keeps the image under
/// [`MAX_SCALED_WIDTH`]. Small text recognizes better when enlarged.
pub(super) fn ocr_scale(width: u32) -> u32 {
    let mut scale = MAX_SCALE;
    while width.saturating_mul(scale) > MAX_SCALED_WIDTH && scale > 1 {
        scale -= 1;
    }
    scale
}

/// Flattens alpha onto white, converts to luma, upscales and stretches the
/// contrast to the full range.
pub(super) fn prepare(image: DynamicImage, scale: u32) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let flatten = |channel: u8| channel as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = 0.299 * flatten(r) + 0.587 * flatten(g) + 0.114 * flatten(b);
        luma.put_pixel(x, y, Luma([value.round() as u8]));
    }

    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };
    contrast_stretch(resized)
}

fn contrast_stretch(mut image: GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), pixel| (min.min(pixel[0]), max.max(pixel[0])));
    if max <= min {
        return image;
    }
    let factor = 255.0 / (max - min) as f32;
    for pixel in image.pixels_mut() {
        pixel[0] = ((pixel[0] - min) as f32 * factor).round() as u8;
    }
    image
}
