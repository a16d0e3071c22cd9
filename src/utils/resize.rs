//! RGB 帧缩放 (fast_image_resize)

use fast_image_resize as fr;
use image::RgbImage;

use crate::error::{Error, Result};

/// 缩放到指定尺寸, 尺寸相同时直接复制 (Bilinear 插值)
pub fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return Err(Error::Resize(format!(
            "cannot resize {}x{} to {}x{}",
            src.width(),
            src.height(),
            width,
            height
        )));
    }

    let src_image = fr::images::Image::from_vec_u8(
        src.width(),
        src.height(),
        src.as_raw().clone(),
        fr::PixelType::U8x3,
    )
    .map_err(|e| Error::Resize(e.to_string()))?;

    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| Error::Resize(e.to_string()))?;

    RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
        .ok_or_else(|| Error::Resize("resized buffer has wrong length".into()))
}
