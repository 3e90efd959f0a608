// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 模型
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use tract_onnx::prelude::{
  tract_ndarray::{ArrayView2, Axis, Ix2},
  *,
};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::LetterboxFrame,
  labels::LabelSet,
  model::{
    DetectResult, Model,
    postprocess::{
      DEFAULT_INPUT_SIZE, PostprocessError, PostprocessParams, check_input_size, postprocess,
    },
  },
  url_path,
};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, BoxedError),
  #[error("推理错误: {0}")]
  InferenceError(BoxedError),
  #[error("模型输出形状错误: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("缺少标签集合")]
  MissingLabels,
  #[error("后处理错误: {0}")]
  PostprocessError(#[from] PostprocessError),
}

impl From<std::io::Error> for YoloError {
  fn from(err: std::io::Error) -> Self {
    YoloError::ModelLoadError(err)
  }
}

impl YoloError {
  pub fn invalid(msg: &str, e: TractError) -> Self {
    YoloError::ModelInvalid(msg.to_string(), e.into())
  }
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct YoloV5Builder {
  model_path: PathBuf,
  labels: Option<LabelSet>,
  input_size: u32,
  params: PostprocessParams,
}

impl FromUrlWithScheme for YoloV5Builder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloV5Builder {
  type Error = YoloError;

  /// `onnx:///path/model.onnx?size=640&conf=0.4&score=0.25&nms=0.45`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = YoloV5Builder::new(url_path(url));
    for (key, value) in url.query_pairs() {
      let invalid = || YoloError::ModelPathError(format!("无效的参数 {}={}", key, value));
      match key.as_ref() {
        "size" => builder.input_size = value.parse().map_err(|_| invalid())?,
        "conf" => builder.params.confidence_threshold = value.parse().map_err(|_| invalid())?,
        "score" => builder.params.score_threshold = value.parse().map_err(|_| invalid())?,
        "nms" => builder.params.nms_threshold = value.parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
      }
    }

    Ok(builder)
  }
}

impl YoloV5Builder {
  pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
    Self {
      model_path: model_path.into(),
      labels: None,
      input_size: DEFAULT_INPUT_SIZE,
      params: PostprocessParams::default(),
    }
  }

  pub fn labels(mut self, labels: LabelSet) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.params.confidence_threshold = threshold;
    self
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.params.score_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.params.nms_threshold = threshold;
    self
  }

  pub fn model_path(&self) -> &std::path::Path {
    &self.model_path
  }

  pub fn params(&self) -> &PostprocessParams {
    &self.params
  }

  pub fn size(&self) -> u32 {
    self.input_size
  }

  pub fn build(self) -> Result<YoloV5, YoloError> {
    let labels = self.labels.ok_or(YoloError::MissingLabels)?;
    check_input_size(self.input_size)?;
    self.params.validate()?;

    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let size = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_read(&mut model_data.as_slice())
      .map_err(|e| YoloError::invalid("无法解析 ONNX 模型", e))?
      .with_input_fact(0, f32::fact([1, 3, size, size]).into())
      .map_err(|e| YoloError::invalid("无法设置模型输入形状", e))?
      .into_optimized()
      .map_err(|e| YoloError::invalid("无法优化模型", e))?
      .into_runnable()
      .map_err(|e| YoloError::invalid("无法构建可执行模型", e))?;
    info!("模型加载完成");

    debug!("模型输入尺寸: {}x{}", size, size);
    debug!("后处理参数: {:?}", self.params);

    Ok(YoloV5 {
      plan,
      labels,
      input_size: self.input_size,
      params: self.params,
    })
  }
}

pub struct YoloV5 {
  plan: OnnxPlan,
  labels: LabelSet,
  input_size: u32,
  params: PostprocessParams,
}

impl YoloV5 {
  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn params(&self) -> &PostprocessParams {
    &self.params
  }

  fn forward(&self, frame: LetterboxFrame) -> Result<TVec<TValue>, YoloError> {
    let tensor = frame.tensor();
    let input = Tensor::from_shape(&tensor.shape(), tensor.as_slice())
      .map_err(|e| YoloError::InferenceError(e.into()))?;

    debug!("执行模型推理");
    self
      .plan
      .run(tvec!(input.into()))
      .map_err(|e| YoloError::InferenceError(e.into()))
  }
}

/// 取出 `[1, rows, 5 + nc]` 输出中的二维行视图
fn output_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>, YoloError> {
  let view = output
    .to_array_view::<f32>()
    .map_err(|e| YoloError::InferenceError(e.into()))?;
  debug!("模型输出形状: {:?}", view.shape());

  if view.ndim() != 3 || view.shape()[0] != 1 {
    error!("模型输出形状不符合预期: {:?}", view.shape());
    return Err(YoloError::OutputShape(view.shape().to_vec()));
  }

  view
    .index_axis_move(Axis(0), 0)
    .into_dimensionality::<Ix2>()
    .map_err(|_| YoloError::OutputShape(output.shape().to_vec()))
}

impl Model for YoloV5 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = YoloError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("预处理输入图像 {}x{}", input.width(), input.height());
    let frame = LetterboxFrame::new(input, self.input_size);
    let side = frame.side();

    let outputs = self.forward(frame)?;
    let output = outputs
      .first()
      .ok_or_else(|| YoloError::OutputShape(Vec::new()))?;
    let rows = output_rows(output)?;

    let result = postprocess(rows, &self.labels, side, self.input_size, &self.params)?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}
