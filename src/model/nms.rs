// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::trace;

/// 整数像素矩形，左上角加宽高
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
  pub left: i32,
  pub top: i32,
  pub width: i32,
  pub height: i32,
}

impl Rect {
  pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  pub fn right(&self) -> i32 {
    self.left.saturating_add(self.width)
  }

  pub fn bottom(&self) -> i32 {
    self.top.saturating_add(self.height)
  }

  pub fn area(&self) -> i64 {
    if self.width <= 0 || self.height <= 0 {
      0
    } else {
      self.width as i64 * self.height as i64
    }
  }

  pub fn intersection_area(&self, other: &Rect) -> i64 {
    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());
    if x2 <= x1 || y2 <= y1 {
      return 0;
    }
    (x2 as i64 - x1 as i64) * (y2 as i64 - y1 as i64)
  }

  /// 交并比，并集为 0 时返回 0
  pub fn iou(&self, other: &Rect) -> f32 {
    let inter = self.intersection_area(other);
    let union = self.area() + other.area() - inter;
    if union <= 0 {
      0.0
    } else {
      inter as f32 / union as f32
    }
  }
}

/// 贪心 NMS，与类别无关
///
/// 分数不大于 `score_threshold` 的框先被丢弃，其余按分数降序（同分保持原顺序）
/// 依次处理；与所有已保留框的 IoU 都不超过 `nms_threshold` 的框被保留。
/// 返回保留框在输入中的索引，按保留顺序排列。
pub fn nms(boxes: &[Rect], scores: &[f32], score_threshold: f32, nms_threshold: f32) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());

  let mut order: Vec<usize> = (0..boxes.len().min(scores.len()))
    .filter(|&i| scores[i] > score_threshold)
    .collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut keep: Vec<usize> = Vec::with_capacity(order.len());
  for idx in order {
    let suppressed = keep.iter().any(|&kept| {
      let overlap = boxes[kept].iou(&boxes[idx]);
      overlap > nms_threshold
    });
    if suppressed {
      trace!("抑制候选框 {}: {:?}", idx, boxes[idx]);
    } else {
      keep.push(idx);
    }
  }

  keep
}
