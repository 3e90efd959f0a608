// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 配置文件
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::model::{PostprocessParams, check_input_size};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// ```toml
/// [detector]
/// model = "models/best.onnx"
/// labels = "models/data.yaml"
/// input_size = 640
/// confidence_threshold = 0.4
/// score_threshold = 0.25
/// nms_threshold = 0.45
///
/// [draw]
/// font = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
  pub detector: DetectorConfig,
  pub draw: DrawConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
  pub model: Option<String>,
  pub labels: Option<PathBuf>,
  pub input_size: u32,
  pub confidence_threshold: f32,
  pub score_threshold: f32,
  pub nms_threshold: f32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    let params = PostprocessParams::default();
    Self {
      model: None,
      labels: None,
      input_size: crate::model::DEFAULT_INPUT_SIZE,
      confidence_threshold: params.confidence_threshold,
      score_threshold: params.score_threshold,
      nms_threshold: params.nms_threshold,
    }
  }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DrawConfig {
  pub font: Option<PathBuf>,
}

impl DetectorConfig {
  pub fn params(&self) -> PostprocessParams {
    PostprocessParams {
      confidence_threshold: self.confidence_threshold,
      score_threshold: self.score_threshold,
      nms_threshold: self.nms_threshold,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_input_size(self.input_size).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    self
      .params()
      .validate()
      .map_err(|e| ConfigError::Invalid(e.to_string()))
  }
}

impl AppConfig {
  pub fn from_file<P>(file_path: P) -> Result<Self, ConfigError>
  where
    P: AsRef<Path>,
  {
    let file_path = file_path.as_ref();
    trace!("读取配置文件 {}", file_path.display());
    let content = std::fs::read_to_string(file_path).inspect_err(|e| {
      error!("无法读取配置文件: {e}");
    })?;

    Self::from_toml_str(&content)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content).inspect_err(|e| {
      error!("无法解析配置文件: {e}");
    })?;
    config.detector.validate()?;

    debug!("配置: {:#?}", config);
    Ok(config)
  }
}
