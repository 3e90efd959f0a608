// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/json_record.rs - 以 JSON 记录检测结果
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectResult, output::Render, url_path};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub struct JsonRecordOutput {
  path: PathBuf,
  pretty: bool,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  /// `json:///out/detections.json[?compact]`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch);
    }

    let compact = uri.query_pairs().any(|(k, _)| k == "compact");

    Ok(JsonRecordOutput {
      path: url_path(uri),
      pretty: !compact,
    })
  }
}

impl JsonRecordOutput {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self {
      path: path.into(),
      pretty: true,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn record(&self, result: &DetectResult) -> Result<(), JsonRecordError> {
    let objects = &result.items[..];
    let content = if self.pretty {
      serde_json::to_string_pretty(objects)?
    } else {
      serde_json::to_string(objects)?
    };

    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    std::fs::write(&self.path, content)?;

    info!("记录 {} 个检测结果到: {}", result.len(), self.path.display());
    Ok(())
  }
}

impl<F> Render<F, DetectResult> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    self.record(result)
  }
}
