// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/postprocess.rs - YOLO 输出解码与后处理
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

use thiserror::Error;
use tract_onnx::prelude::tract_ndarray::{ArrayView2, Axis};
use tracing::{debug, error, trace};

use crate::{
  labels::LabelSet,
  model::{
    DetectResult, DetectedObject, Distance, Position,
    nms::{Rect, nms},
  },
};

/// 每行前 5 列: cx, cy, w, h, objectness
const YOLO_BOX_COLUMNS: usize = 5;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug, PartialEq)]
pub enum PostprocessError {
  #[error("输入尺寸必须是 32 的正整数倍, 实际为 {0}")]
  InvalidInputSize(u32),
  #[error("{name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("输出列数不匹配: 期望 {expected} 列 (5 + {classes} 个类别), 实际 {actual} 列")]
  ColumnMismatch {
    expected: usize,
    classes: usize,
    actual: usize,
  },
}

/// 后处理阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessParams {
  /// objectness 必须严格大于该值
  pub confidence_threshold: f32,
  /// 最大类别分数必须严格大于该值，同时作为 NMS 的分数阈值
  pub score_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
}

impl Default for PostprocessParams {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
    }
  }
}

impl PostprocessParams {
  pub fn validate(&self) -> Result<(), PostprocessError> {
    for (name, value) in [
      ("confidence_threshold", self.confidence_threshold),
      ("score_threshold", self.score_threshold),
      ("nms_threshold", self.nms_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(PostprocessError::InvalidThreshold { name, value });
      }
    }
    Ok(())
  }
}

/// 网络输入边长需为步长 32 的正整数倍
pub fn check_input_size(input_size: u32) -> Result<(), PostprocessError> {
  if input_size == 0 || input_size % 32 != 0 {
    return Err(PostprocessError::InvalidInputSize(input_size));
  }
  Ok(())
}

/// 通过阈值筛选的候选框，坐标位于补齐后的正方形图像中
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub confidence: f32,
  pub class_score: f32,
  pub rect: Rect,
}

/// 解码网络输出 `rows x (5 + nc)`，`scale` 为网络坐标到图像坐标的缩放系数
pub fn decode(
  output: ArrayView2<'_, f32>,
  num_classes: usize,
  scale: f64,
  params: &PostprocessParams,
) -> Result<Vec<Candidate>, PostprocessError> {
  let expected = YOLO_BOX_COLUMNS + num_classes;
  let actual = output.ncols();
  if actual != expected {
    error!("模型输出列数 {} 与类别数 {} 不匹配", actual, num_classes);
    return Err(PostprocessError::ColumnMismatch {
      expected,
      classes: num_classes,
      actual,
    });
  }

  let mut candidates = Vec::new();

  for (row_idx, row) in output.axis_iter(Axis(0)).enumerate() {
    let confidence = row[4];
    if !(confidence > params.confidence_threshold) {
      continue;
    }

    // 取最大类别分数，同分取靠前的索引
    let (class_id, class_score) = row
      .iter()
      .skip(YOLO_BOX_COLUMNS)
      .copied()
      .enumerate()
      .fold((0usize, f32::NEG_INFINITY), |best, (idx, score)| {
        if score > best.1 { (idx, score) } else { best }
      });

    if !(class_score > params.score_threshold) {
      continue;
    }

    let (cx, cy, w, h) = (
      f64::from(row[0]),
      f64::from(row[1]),
      f64::from(row[2]),
      f64::from(row[3]),
    );
    let rect = Rect::new(
      ((cx - 0.5 * w) * scale) as i32,
      ((cy - 0.5 * h) * scale) as i32,
      (w * scale) as i32,
      (h * scale) as i32,
    );

    trace!(
      "候选框 {}: 类别 {} 分数 {:.3} 置信度 {:.3} {:?}",
      row_idx, class_id, class_score, confidence, rect
    );

    candidates.push(Candidate {
      class_id,
      confidence,
      class_score,
      rect,
    });
  }

  debug!("阈值筛选后剩余 {} 个候选框", candidates.len());
  Ok(candidates)
}

/// 解码、NMS 并生成最终检测结果
///
/// `side` 为补齐后正方形的边长，位置与远近均以它为参照。
pub fn postprocess(
  output: ArrayView2<'_, f32>,
  labels: &LabelSet,
  side: u32,
  input_size: u32,
  params: &PostprocessParams,
) -> Result<DetectResult, PostprocessError> {
  check_input_size(input_size)?;
  let scale = f64::from(side) / f64::from(input_size);
  let candidates = decode(output, labels.len(), scale, params)?;

  let boxes: Vec<Rect> = candidates.iter().map(|c| c.rect).collect();
  let scores: Vec<f32> = candidates.iter().map(|c| c.confidence).collect();
  let keep = nms(&boxes, &scores, params.score_threshold, params.nms_threshold);
  debug!("NMS 后保留 {} 个目标", keep.len());

  let items: Vec<DetectedObject> = keep
    .into_iter()
    .map(|idx| {
      let candidate = &candidates[idx];
      let rect = candidate.rect;
      // decode 已保证 class_id < labels.len()
      let label = labels.get(candidate.class_id).unwrap_or("unknown").to_string();
      DetectedObject {
        label,
        class_id: candidate.class_id,
        score: candidate.confidence,
        confidence: (f64::from(candidate.confidence) * 100.0) as u32,
        position: Position::from_left_edge(rect.left, side),
        distance: Distance::from_box_height(rect.height, side),
        x1: rect.left,
        y1: rect.top,
        x2: rect.right(),
        y2: rect.bottom(),
      }
    })
    .collect();

  Ok(DetectResult::from(items))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tract_onnx::prelude::tract_ndarray::Array2;

  fn labels() -> LabelSet {
    LabelSet::from_names(["person", "car", "dog"]).unwrap()
  }

  fn output(rows: &[[f32; 8]]) -> Array2<f32> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), 8), flat).unwrap()
  }

  #[test]
  fn rejects_column_mismatch() {
    let output = Array2::<f32>::zeros((4, 7));
    let err = decode(output.view(), 3, 1.0, &PostprocessParams::default()).unwrap_err();
    assert_eq!(
      err,
      PostprocessError::ColumnMismatch {
        expected: 8,
        classes: 3,
        actual: 7
      }
    );
  }

  #[test]
  fn thresholds_are_strict() {
    let output = output(&[
      // objectness 恰好等于阈值
      [100.0, 100.0, 20.0, 20.0, 0.4, 0.9, 0.0, 0.0],
      // 类别分数恰好等于阈值
      [100.0, 100.0, 20.0, 20.0, 0.9, 0.25, 0.1, 0.0],
      // 通过
      [100.0, 100.0, 20.0, 20.0, 0.41, 0.0, 0.26, 0.0],
    ]);
    let candidates = decode(output.view(), 3, 1.0, &PostprocessParams::default()).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
    assert_eq!(candidates[0].confidence, 0.41);
    assert_eq!(candidates[0].class_score, 0.26);
  }

  #[test]
  fn argmax_prefers_first_on_ties() {
    let output = output(&[[10.0, 10.0, 4.0, 4.0, 0.8, 0.5, 0.7, 0.7]]);
    let candidates = decode(output.view(), 3, 1.0, &PostprocessParams::default()).unwrap();
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn boxes_are_rescaled_and_truncated() {
    // scale 1.5: left = (100 - 25.5) * 1.5 = 111.75 -> 111
    let output = output(&[[100.0, 50.0, 51.0, 33.0, 0.9, 0.0, 0.0, 0.8]]);
    let candidates = decode(output.view(), 3, 1.5, &PostprocessParams::default()).unwrap();
    assert_eq!(candidates[0].rect, Rect::new(111, 50, 76, 49));
  }

  #[test]
  fn negative_coordinates_truncate_toward_zero() {
    let output = output(&[[2.0, 2.0, 10.0, 10.0, 0.9, 0.8, 0.0, 0.0]]);
    let candidates = decode(output.view(), 3, 1.1, &PostprocessParams::default()).unwrap();
    // (2 - 5) * 1.1 = -3.3 -> -3
    assert_eq!(candidates[0].rect.left, -3);
    assert_eq!(candidates[0].rect.top, -3);
  }

  #[test]
  fn postprocess_builds_objects_in_confidence_order() {
    let output = output(&[
      // 左侧的人，与下一行高度重叠，置信度较低
      [60.0, 300.0, 80.0, 400.0, 0.7, 0.9, 0.0, 0.0],
      [62.0, 302.0, 80.0, 400.0, 0.95, 0.85, 0.0, 0.0],
      // 右侧的车
      [560.0, 100.0, 60.0, 40.0, 0.6, 0.0, 0.9, 0.0],
      // 被阈值过滤
      [320.0, 320.0, 10.0, 10.0, 0.3, 0.0, 0.0, 0.9],
    ]);
    let result = postprocess(output.view(), &labels(), 1280, 640, &PostprocessParams::default())
      .unwrap();

    assert_eq!(result.len(), 2);

    let person = &result.items[0];
    assert_eq!(person.label, "person");
    assert_eq!(person.class_id, 0);
    // f32 的 0.95 略小于 0.95
    assert_eq!(person.confidence, 94);
    assert_eq!((person.x1, person.y1, person.x2, person.y2), (44, 204, 204, 1004));
    assert_eq!(person.position, Position::Left);
    assert_eq!(person.distance, Distance::Near);

    let car = &result.items[1];
    assert_eq!(car.label, "car");
    assert_eq!(car.confidence, 60);
    assert_eq!((car.x1, car.y1, car.x2, car.y2), (1060, 160, 1180, 240));
    assert_eq!(car.position, Position::Right);
    assert_eq!(car.distance, Distance::Far);
  }

  #[test]
  fn confidence_percent_truncates_exact_value() {
    let output = output(&[
      [100.0, 100.0, 20.0, 20.0, 0.7, 0.9, 0.0, 0.0],
      [300.0, 100.0, 20.0, 20.0, 0.9, 0.9, 0.0, 0.0],
      [500.0, 100.0, 20.0, 20.0, 0.57, 0.9, 0.0, 0.0],
      [100.0, 400.0, 20.0, 20.0, 0.6, 0.9, 0.0, 0.0],
    ]);
    let result =
      postprocess(output.view(), &labels(), 640, 640, &PostprocessParams::default()).unwrap();
    let percents: Vec<u32> = result.iter().map(|o| o.confidence).collect();
    assert_eq!(percents, vec![89, 69, 60, 56]);
  }

  #[test]
  fn extreme_coordinates_saturate() {
    let output = output(&[[3e9, 100.0, 1e9, 20.0, 0.9, 0.9, 0.0, 0.0]]);
    let result =
      postprocess(output.view(), &labels(), 640, 640, &PostprocessParams::default()).unwrap();
    let object = &result.items[0];
    assert_eq!(object.x1, i32::MAX);
    assert_eq!(object.x2, i32::MAX);
    assert_eq!(object.width(), 0);
    assert_eq!(object.position, Position::Right);
  }

  #[test]
  fn zero_input_size_is_rejected() {
    let output = Array2::<f32>::zeros((1, 8));
    let err =
      postprocess(output.view(), &labels(), 640, 0, &PostprocessParams::default()).unwrap_err();
    assert_eq!(err, PostprocessError::InvalidInputSize(0));
  }

  #[test]
  fn params_outside_unit_range_are_rejected() {
    assert!(PostprocessParams::default().validate().is_ok());
    let params = PostprocessParams {
      nms_threshold: 2.0,
      ..PostprocessParams::default()
    };
    assert_eq!(
      params.validate(),
      Err(PostprocessError::InvalidThreshold {
        name: "nms_threshold",
        value: 2.0
      })
    );
    assert!(check_input_size(320).is_ok());
    assert_eq!(check_input_size(500), Err(PostprocessError::InvalidInputSize(500)));
  }

  #[test]
  fn postprocess_without_candidates_is_empty() {
    let output = Array2::<f32>::zeros((25, 8));
    let result =
      postprocess(output.view(), &labels(), 640, 640, &PostprocessParams::default()).unwrap();
    assert!(result.is_empty());
  }
}
