// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧检测
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kanjian::{
  FromUrl,
  config::AppConfig,
  input::ImageFileInput,
  labels::LabelSet,
  model::YoloV5Builder,
  output::{OutputWrapper, draw::Palette},
  parse_url_or_path,
  task::{OneShotTask, Task},
};

/// Kanjian 单帧检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径或 URL，例如 onnx:///models/best.onnx?size=640
  #[arg(long, value_name = "MODEL")]
  pub model: Option<String>,
  /// 标签文件（YAML 或 TOML）
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,
  /// 输入图像路径或 URL
  #[arg(long, value_name = "SOURCE")]
  pub input: String,
  /// 输出 URL，可重复，例如 image:///out.png 或 json:///out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<String>,
  /// TOML 配置文件
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
  /// 模型输入尺寸
  #[arg(long)]
  pub size: Option<u32>,
  /// 目标置信度阈值
  #[arg(long)]
  pub confidence: Option<f32>,
  /// 类别分数阈值
  #[arg(long)]
  pub score: Option<f32>,
  /// NMS 重叠阈值
  #[arg(long)]
  pub nms: Option<f32>,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

impl Args {
  /// 命令行参数覆盖配置文件
  fn merge_into(&self, config: &mut AppConfig) {
    let detector = &mut config.detector;
    if let Some(model) = &self.model {
      detector.model = Some(model.clone());
    }
    if let Some(labels) = &self.labels {
      detector.labels = Some(labels.clone());
    }
    if let Some(size) = self.size {
      detector.input_size = size;
    }
    if let Some(confidence) = self.confidence {
      detector.confidence_threshold = confidence;
    }
    if let Some(score) = self.score {
      detector.score_threshold = score;
    }
    if let Some(nms) = self.nms {
      detector.nms_threshold = nms;
    }
    if let Some(font) = &self.font {
      config.draw.font = Some(font.clone());
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => AppConfig::from_file(path)?,
    None => AppConfig::default(),
  };
  args.merge_into(&mut config);
  config.detector.validate()?;

  let model = config
    .detector
    .model
    .as_deref()
    .context("未指定模型文件")?;
  let labels = config
    .detector
    .labels
    .as_ref()
    .context("未指定标签文件")?;

  info!("模型文件: {}", model);
  info!("标签文件: {}", labels.display());
  info!("输入来源: {}", args.input);

  let labels = LabelSet::from_file(labels)?;
  let palette = Palette::generate(labels.len());

  // URL 查询参数优先于配置
  let model_url = parse_url_or_path(model, "onnx")?;
  let in_query = |key: &str| model_url.query_pairs().any(|(k, _)| k == key);
  let mut builder = YoloV5Builder::from_url(&model_url)?;
  if !in_query("size") {
    builder = builder.input_size(config.detector.input_size);
  }
  if !in_query("conf") {
    builder = builder.confidence_threshold(config.detector.confidence_threshold);
  }
  if !in_query("score") {
    builder = builder.score_threshold(config.detector.score_threshold);
  }
  if !in_query("nms") {
    builder = builder.nms_threshold(config.detector.nms_threshold);
  }
  let model = builder.labels(labels).build()?;

  let input = ImageFileInput::from_url(&parse_url_or_path(&args.input, "image")?)?;

  let mut outputs = Vec::with_capacity(args.output.len());
  for output in &args.output {
    let mut url = parse_url_or_path(output, "image")?;
    if url.scheme() == "image" {
      if let Some(font) = &config.draw.font {
        if !url.query_pairs().any(|(k, _)| k == "font") {
          url
            .query_pairs_mut()
            .append_pair("font", &font.to_string_lossy());
        }
      }
    }
    info!("输出: {}", url);
    outputs.push(OutputWrapper::from_url(&url)?.with_palette(palette.clone()));
  }

  let result = OneShotTask.run_task(input, &model, &outputs)?;
  info!("检测到 {} 个目标", result.len());

  println!("{}", serde_json::to_string_pretty(&result.items[..])?);

  Ok(())
}
