// 该文件是 Yanshi （演示） 项目的一部分。
// src/frame.rs - 图像解码与 NCHW 张量
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

const RGB_CHANNELS: usize = 3;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 将任意受支持格式的图像字节解码为 RGB 图像
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
  let image = image::load_from_memory(bytes)?.to_rgb8();
  debug!("解码图像: {}x{}", image.width(), image.height());
  Ok(image)
}

/// 按最短边缩放并保持宽高比；最长边超过 `longest` 时相应缩小最短边
///
/// 返回 (高, 宽)。
pub fn shortest_edge_size(height: u32, width: u32, shortest: u32, longest: u32) -> (u32, u32) {
  let (h, w) = (height as f64, width as f64);
  let (min_side, max_side) = (h.min(w), h.max(w));

  let mut size = shortest as f64;
  if max_side / min_side * size > longest as f64 {
    size = (longest as f64 * min_side / max_side).round();
  }

  if (height <= width && height as f64 == size) || (width <= height && width as f64 == size) {
    return (height, width);
  }

  if width < height {
    (((size * h / w) as u32).max(1), (size as u32).max(1))
  } else {
    ((size as u32).max(1), ((size * w / h) as u32).max(1))
  }
}

pub fn resize_shortest_edge(image: &RgbImage, shortest: u32, longest: u32) -> RgbImage {
  let (h, w) = shortest_edge_size(image.height(), image.width(), shortest, longest);
  if (h, w) == (image.height(), image.width()) {
    return image.clone();
  }
  debug!(
    "缩放图像: {}x{} -> {}x{}",
    image.width(),
    image.height(),
    w,
    h
  );
  image::imageops::resize(image, w, h, FilterType::Triangle)
}

/// `[1, 3, H, W]` 的浮点张量，通道按 RGB 排列
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  height: usize,
  width: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  /// 像素先缩放到 [0, 1]，再按通道做 `(x - mean) / std`
  pub fn from_rgb_image(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Self {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane_size = width * height;
    let mut data = vec![0f32; plane_size * RGB_CHANNELS];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = y as usize * width + x as usize;
      for c in 0..RGB_CHANNELS {
        let value = pixel[c] as f32 / 255.0;
        data[c * plane_size + idx] = (value - mean[c]) / std[c];
      }
    }

    NchwTensor {
      height,
      width,
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{ImageFormat, Rgb};

  use super::*;

  #[test]
  fn decodes_png_bytes() {
    let image = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();

    let decoded = decode_image(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (4, 3));
    assert_eq!(decoded.get_pixel(1, 1), &Rgb([10, 20, 30]));
  }

  #[test]
  fn rejects_garbage_bytes() {
    assert!(decode_image(b"definitely not an image").is_err());
    assert!(decode_image(&[]).is_err());
  }

  #[test]
  fn shortest_edge_keeps_aspect_ratio() {
    // 横图：高为最短边
    assert_eq!(shortest_edge_size(480, 640, 512, 1333), (512, 682));
    // 竖图：宽为最短边
    assert_eq!(shortest_edge_size(640, 480, 512, 1333), (682, 512));
    // 已经符合要求
    assert_eq!(shortest_edge_size(512, 700, 512, 1333), (512, 700));
  }

  #[test]
  fn long_images_shrink_the_short_side() {
    assert_eq!(shortest_edge_size(100, 2000, 512, 1333), (67, 1340));
  }

  #[test]
  fn nchw_layout_and_normalisation() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 255, 0]));

    let tensor = NchwTensor::from_rgb_image(&image, [0.0; 3], [1.0; 3]);
    assert_eq!(tensor.shape(), [1, 3, 1, 2]);
    assert_eq!(tensor.as_slice(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    let tensor = NchwTensor::from_rgb_image(&image, [0.5; 3], [0.5; 3]);
    assert_eq!(tensor.as_slice(), &[1.0, -1.0, -1.0, 1.0, -1.0, -1.0]);
  }
}
