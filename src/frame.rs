// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 输入帧预处理（补齐正方形、缩放、NCHW 张量）
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Kanjian Contributors

use image::{RgbImage, imageops};

const RGB_CHANNELS: usize = 3;

/// 将图像放入边长为 max(宽, 高) 的黑色正方形画布左上角
pub fn pad_to_square(image: &RgbImage) -> RgbImage {
  let (width, height) = image.dimensions();
  let side = width.max(height);
  if width == height {
    return image.clone();
  }

  let mut canvas = RgbImage::new(side, side);
  imageops::replace(&mut canvas, image, 0, 0);
  canvas
}

/// NCHW 排列的浮点 RGB 张量，取值范围 [0, 1]
#[derive(Debug, Clone)]
pub struct RgbNchwTensor {
  size: usize,
  data: Box<[f32]>,
}

impl RgbNchwTensor {
  /// 缩放到 size x size 并归一化
  pub fn from_rgb_image(image: &RgbImage, size: u32) -> Self {
    let resized = if image.dimensions() == (size, size) {
      image.clone()
    } else {
      imageops::resize(image, size, size, imageops::FilterType::Triangle)
    };

    let size = size as usize;
    let plane = size * size;
    let mut data = vec![0f32; RGB_CHANNELS * plane];

    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * size + (x as usize);
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Self {
      size,
      data: data.into_boxed_slice(),
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// 张量形状 [1, 3, size, size]
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.size, self.size]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

/// 一次推理的输入：补齐后的正方形边长与网络输入张量
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  side: u32,
  tensor: RgbNchwTensor,
}

impl LetterboxFrame {
  pub fn new(image: &RgbImage, input_size: u32) -> Self {
    let square = pad_to_square(image);
    let side = square.width();
    let tensor = RgbNchwTensor::from_rgb_image(&square, input_size);
    Self { side, tensor }
  }

  /// 补齐后正方形的边长（像素）
  pub fn side(&self) -> u32 {
    self.side
  }

  pub fn tensor(&self) -> &RgbNchwTensor {
    &self.tensor
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn wide_image_is_padded_below() {
    let image = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
    let square = pad_to_square(&image);
    assert_eq!(square.dimensions(), (4, 4));
    assert_eq!(*square.get_pixel(3, 1), Rgb([10, 20, 30]));
    assert_eq!(*square.get_pixel(0, 2), Rgb([0, 0, 0]));
    assert_eq!(*square.get_pixel(3, 3), Rgb([0, 0, 0]));
  }

  #[test]
  fn tall_image_is_padded_right() {
    let image = RgbImage::from_pixel(2, 3, Rgb([255, 255, 255]));
    let square = pad_to_square(&image);
    assert_eq!(square.dimensions(), (3, 3));
    assert_eq!(*square.get_pixel(1, 2), Rgb([255, 255, 255]));
    assert_eq!(*square.get_pixel(2, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn tensor_is_planar_and_normalized() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(1, 0, Rgb([255, 0, 51]));
    let tensor = RgbNchwTensor::from_rgb_image(&image, 2);

    assert_eq!(tensor.shape(), [1, 3, 2, 2]);
    let data = tensor.as_slice();
    assert_eq!(data.len(), 12);
    // (x = 1, y = 0) -> 平面内索引 1
    assert_eq!(data[1], 1.0);
    assert_eq!(data[4 + 1], 0.0);
    assert!((data[8 + 1] - 0.2).abs() < 1e-6);
    assert_eq!(data[0], 0.0);
  }

  #[test]
  fn letterbox_keeps_padded_side() {
    let image = RgbImage::new(1280, 720);
    let frame = LetterboxFrame::new(&image, 640);
    assert_eq!(frame.side(), 1280);
    assert_eq!(frame.tensor().shape(), [1, 3, 640, 640]);
  }
}
