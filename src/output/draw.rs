// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DetectResult, DetectedObject};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_BAND_HEIGHT: i32 = 30;
const LABEL_TEXT_OFFSET: i32 = 24; // 文本顶部距框顶的距离
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const BOX_THICKNESS: i32 = 2;
// 画面外允许保留的坐标范围
const CLIP_MARGIN: i64 = 1 << 16;

const PALETTE_SEED: u64 = 10;
const PALETTE_SIZE: usize = 80;

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "/Library/Fonts/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 每个类别一种颜色，固定种子生成，各通道取值 [100, 255)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
  colors: Vec<Rgb<u8>>,
}

impl Palette {
  pub fn generate(num_classes: usize) -> Self {
    let mut rng = StdRng::seed_from_u64(PALETTE_SEED);
    let colors = (0..num_classes)
      .map(|_| {
        Rgb([
          rng.gen_range(100..255),
          rng.gen_range(100..255),
          rng.gen_range(100..255),
        ])
      })
      .collect();
    Self { colors }
  }

  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    match self.colors.get(class_id) {
      Some(color) => *color,
      None => Palette::generate(class_id + 1).colors[class_id],
    }
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }
}

impl Default for Palette {
  fn default() -> Self {
    Palette::generate(PALETTE_SIZE)
  }
}

fn load_font(path: &Path) -> Result<FontArc, DrawError> {
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

fn find_system_font() -> Option<FontArc> {
  SYSTEM_FONT_CANDIDATES.iter().find_map(|candidate| {
    let path = Path::new(candidate);
    if !path.exists() {
      return None;
    }
    match load_font(path) {
      Ok(font) => {
        debug!("使用系统字体: {}", candidate);
        Some(font)
      }
      Err(e) => {
        warn!("无法加载字体 {}: {}", candidate, e);
        None
      }
    }
  })
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  band_height: i32,
  text_offset: i32,
  thickness: i32,
  text_color: Rgb<u8>,
  palette: Palette,
}

impl Default for Draw {
  fn default() -> Self {
    let font = find_system_font();
    if font.is_none() {
      warn!("未找到可用字体，只绘制边框与标签底色");
    }
    Self::new(font)
  }
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      band_height: LABEL_BAND_HEIGHT,
      text_offset: LABEL_TEXT_OFFSET,
      thickness: BOX_THICKNESS,
      text_color: Rgb(LABEL_TEXT_COLOR),
      palette: Palette::default(),
    }
  }

  pub fn with_font_file<P: AsRef<Path>>(path: P) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let font = load_font(path)?;
    info!("加载字体文件: {}", path.display());
    Ok(Self::new(Some(font)))
  }

  pub fn with_palette(mut self, palette: Palette) -> Self {
    self.palette = palette;
    self
  }

  pub fn palette(&self) -> &Palette {
    &self.palette
  }

  /// 按结果顺序绘制所有目标
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for object in result.iter() {
      self.draw_object(image, object);
    }
  }

  /// 边框、框顶上方的实心标签栏以及标签文本
  pub fn draw_object(&self, image: &mut RgbImage, object: &DetectedObject) {
    if object.width() <= 0 || object.height() <= 0 {
      debug!("跳过退化的检测框: {:?}", object);
      return;
    }

    // 远离画面的坐标先收拢到画面附近，绘制时再由 imageproc 裁剪
    let clamp = |v: i32, extent: u32| {
      (v as i64).clamp(-CLIP_MARGIN, extent as i64 + CLIP_MARGIN) as i32
    };
    let (x, y) = (clamp(object.x1, image.width()), clamp(object.y1, image.height()));
    let x2 = clamp(object.x2, image.width());
    let y2 = clamp(object.y2, image.height());
    let (width, height) = (x2 - x, y2 - y);
    if width <= 0 || height <= 0 {
      return;
    }

    let color = self.palette.color(object.class_id);

    // 边框包含 x2/y2 所在的像素
    for t in 0..self.thickness {
      let w = width + 1 - 2 * t;
      let h = height + 1 - 2 * t;
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x + t, y + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let band = Rect::at(x, y - self.band_height)
      .of_size((width + 1) as u32, self.band_height as u32 + 1);
    draw_filled_rect_mut(image, band, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        self.text_color,
        x,
        y - self.text_offset,
        PxScale::from(self.font_size),
        font,
        &object.caption(),
      );
    }
  }

  /// 在图像副本上绘制
  pub fn annotate(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = image.clone();
    self.draw_detections(&mut image, result);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Distance, Position};

  fn object(class_id: usize, x1: i32, y1: i32, x2: i32, y2: i32) -> DetectedObject {
    DetectedObject {
      label: "person".to_string(),
      class_id,
      score: 0.9,
      confidence: 90,
      position: Position::Center,
      distance: Distance::Far,
      x1,
      y1,
      x2,
      y2,
    }
  }

  #[test]
  fn palette_is_deterministic_and_bounded() {
    let a = Palette::generate(20);
    let b = Palette::generate(20);
    assert_eq!(a, b);
    for id in 0..20 {
      let Rgb(channels) = a.color(id);
      assert!(channels.iter().all(|&c| (100..255).contains(&c)));
    }
  }

  #[test]
  fn palette_extends_beyond_its_size() {
    let small = Palette::generate(3);
    let large = Palette::generate(10);
    assert_eq!(small.color(1), large.color(1));
    assert_eq!(small.color(7), large.color(7));
  }

  #[test]
  fn draws_box_and_band_in_class_color() {
    let draw = Draw::new(None);
    let mut image = RgbImage::new(100, 100);
    let target = object(2, 20, 50, 60, 90);
    draw.draw_object(&mut image, &target);

    let color = draw.palette().color(2);
    // 边框四边
    assert_eq!(*image.get_pixel(20, 70), color);
    assert_eq!(*image.get_pixel(60, 70), color);
    assert_eq!(*image.get_pixel(40, 90), color);
    // 第二圈边框
    assert_eq!(*image.get_pixel(21, 70), color);
    // 框内部不被填充
    assert_eq!(*image.get_pixel(40, 70), Rgb([0, 0, 0]));
    // 标签栏位于框顶上方
    assert_eq!(*image.get_pixel(40, 25), color);
    assert_eq!(*image.get_pixel(40, 19), Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_partly_outside_are_clipped() {
    let draw = Draw::new(None);
    let mut image = RgbImage::new(50, 50);
    let target = object(0, -10, 5, 30, 80);
    draw.draw_object(&mut image, &target);
    let color = draw.palette().color(0);
    assert_eq!(*image.get_pixel(30, 20), color);
    assert_eq!(*image.get_pixel(0, 0), color);
  }

  #[test]
  fn extreme_coordinates_do_not_overflow() {
    let draw = Draw::new(None);
    let mut image = RgbImage::new(40, 40);
    draw.draw_object(&mut image, &object(1, i32::MIN, 10, i32::MAX, 30));
    let color = draw.palette().color(1);
    // 上下边框横穿整幅图像
    assert_eq!(*image.get_pixel(20, 10), color);
    assert_eq!(*image.get_pixel(20, 30), color);
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));

    // 完全位于画面右侧
    let mut untouched = RgbImage::new(40, 40);
    draw.draw_object(&mut untouched, &object(1, i32::MAX - 10, 10, i32::MAX, 30));
    assert!(untouched.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let draw = Draw::new(None);
    let mut image = RgbImage::new(50, 50);
    draw.draw_object(&mut image, &object(0, 10, 40, 10, 45));
    draw.draw_object(&mut image, &object(0, 10, 40, 20, 40));
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn annotate_leaves_source_untouched() {
    let draw = Draw::new(None);
    let source = RgbImage::new(64, 64);
    let result = DetectResult::from(vec![object(1, 10, 40, 30, 60)]);
    let annotated = draw.annotate(&source, &result);
    assert!(source.pixels().all(|p| *p == Rgb([0, 0, 0])));
    assert_eq!(*annotated.get_pixel(10, 50), draw.palette().color(1));
  }

  #[test]
  fn invalid_font_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(Draw::with_font_file(&path), Err(DrawError::InvalidFont(_))));
    assert!(matches!(
      Draw::with_font_file(dir.path().join("missing.ttf")),
      Err(DrawError::IoError(_))
    ));
  }
}
