// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型与检测结果定义
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

use std::fmt;

use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 目标在画面中的水平位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
  Left,
  Center,
  Right,
}

impl Position {
  /// 按左边界落在画面的哪一个三分之一区间划分
  pub fn from_left_edge(left: i32, frame_width: u32) -> Self {
    let left = left as f32;
    let width = frame_width as f32;
    if left < width / 3.0 {
      Position::Left
    } else if left > 2.0 * width / 3.0 {
      Position::Right
    } else {
      Position::Center
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Position::Left => "left",
      Position::Center => "center",
      Position::Right => "right",
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 目标的粗略远近
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
  Near,
  Far,
}

impl Distance {
  /// 框高超过画面一半视为近处
  pub fn from_box_height(height: i32, frame_height: u32) -> Self {
    if height as f32 > frame_height as f32 / 2.0 {
      Distance::Near
    } else {
      Distance::Far
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Distance::Near => "near",
      Distance::Far => "far",
    }
  }
}

impl fmt::Display for Distance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 单个检测结果，构造后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
  pub label: String,
  #[serde(skip)]
  pub class_id: usize,
  #[serde(skip)]
  pub score: f32,
  /// 置信度百分比（截断取整）
  pub confidence: u32,
  pub position: Position,
  pub distance: Distance,
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl DetectedObject {
  pub fn width(&self) -> i32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> i32 {
    self.y2.saturating_sub(self.y1)
  }

  /// 绘制在标签栏中的文本
  pub fn caption(&self) -> String {
    format!("{}: {}%", self.label, self.confidence)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectedObject]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectedObject> {
    self.items.iter()
  }
}

impl From<Vec<DetectedObject>> for DetectResult {
  fn from(items: Vec<DetectedObject>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a DetectResult {
  type Item = &'a DetectedObject;
  type IntoIter = std::slice::Iter<'a, DetectedObject>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

pub mod nms;
mod postprocess;
mod yolov5;

pub use self::postprocess::{
  Candidate, DEFAULT_INPUT_SIZE, PostprocessError, PostprocessParams, check_input_size, decode,
  postprocess,
};
pub use self::yolov5::{YoloError, YoloV5, YoloV5Builder};
