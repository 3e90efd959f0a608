// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, DrawError, Palette},
  },
  url_path,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的参数: {0}")]
  InvalidQuery(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  /// `image:///out/annotated.png?font=/path/to/font.ttf`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut font = None;
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "font" => font = Some(PathBuf::from(v.into_owned())),
        other => return Err(SaveImageFileError::InvalidQuery(other.to_string())),
      }
    }

    let draw = match font {
      Some(font) => Draw::with_font_file(font)?,
      None => Draw::default(),
    };

    Ok(SaveImageFileOutput::new(url_path(uri), draw))
  }
}

impl SaveImageFileOutput {
  pub fn new<P: Into<PathBuf>>(path: P, draw: Draw) -> Self {
    Self {
      path: path.into(),
      draw,
    }
  }

  /// 按类别数重新生成调色板
  pub fn with_palette(mut self, palette: Palette) -> Self {
    self.draw = self.draw.with_palette(palette);
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
      }
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbImage, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw.annotate(frame, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectedObject, Distance, Position};
  use image::Rgb;

  #[test]
  fn saves_annotated_image_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let output = SaveImageFileOutput::new(&path, Draw::new(None));

    let frame = RgbImage::from_pixel(80, 60, Rgb([5, 5, 5]));
    let result = DetectResult::from(vec![DetectedObject {
      label: "cup".to_string(),
      class_id: 0,
      score: 0.8,
      confidence: 80,
      position: Position::Left,
      distance: Distance::Near,
      x1: 10,
      y1: 35,
      x2: 40,
      y2: 58,
    }]);
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (80, 60));
    assert_eq!(*saved.get_pixel(10, 45), Palette::default().color(0));
    assert_eq!(*saved.get_pixel(25, 45), Rgb([5, 5, 5]));
  }

  #[test]
  fn from_url_rejects_unknown_query() {
    let url = Url::parse("image:///tmp/out.png?quality=90").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::InvalidQuery(q)) if q == "quality"
    ));
  }

  #[test]
  fn from_url_rejects_other_scheme() {
    let url = Url::parse("json:///tmp/out.png").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
