// 该文件是 Kanjian （看见） 项目的一部分。
// src/labels.rs - 类别标签集合
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

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("YAML 解析错误: {0}")]
  YamlError(#[from] serde_yaml::Error),
  #[error("TOML 解析错误: {0}")]
  TomlError(#[from] toml::de::Error),
  #[error("不支持的标签文件格式: {0}")]
  UnsupportedFormat(String),
  #[error("标签列表为空")]
  Empty,
  #[error("类别数量不匹配: nc = {nc}, names 中有 {names} 项")]
  CountMismatch { nc: usize, names: usize },
  #[error("类别索引不连续: 缺少索引 {0}")]
  MissingIndex(usize),
}

/// 数据文件中的 `names` 字段，既可以是列表也可以是 索引 -> 名称 的映射
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Names {
  List(Vec<String>),
  Map(BTreeMap<usize, String>),
}

#[derive(Deserialize, Debug)]
struct DataFile {
  nc: Option<usize>,
  names: Names,
}

/// 类别索引到名称的映射，启动时加载一次，之后只读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  names: Box<[String]>,
}

impl LabelSet {
  pub fn from_names<I, S>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Box<[String]> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self { names })
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());

    let content = std::fs::read_to_string(path).inspect_err(|e| {
      error!("无法读取标签文件 {}: {}", path.display(), e);
    })?;

    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| ext.to_ascii_lowercase())
      .unwrap_or_default();

    let labels = match extension.as_str() {
      "yaml" | "yml" => Self::from_yaml_str(&content)?,
      "toml" => Self::from_toml_str(&content)?,
      other => return Err(LabelError::UnsupportedFormat(other.to_string())),
    };

    info!("标签加载完成，共 {} 个类别", labels.len());
    Ok(labels)
  }

  pub fn from_yaml_str(content: &str) -> Result<Self, LabelError> {
    let data: DataFile = serde_yaml::from_str(content)?;
    Self::from_data_file(data)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, LabelError> {
    let data: DataFile = toml::from_str(content)?;
    Self::from_data_file(data)
  }

  fn from_data_file(data: DataFile) -> Result<Self, LabelError> {
    let names = match data.names {
      Names::List(names) => names,
      Names::Map(map) => {
        let mut names = Vec::with_capacity(map.len());
        for (expected, (index, name)) in map.into_iter().enumerate() {
          if index != expected {
            return Err(LabelError::MissingIndex(expected));
          }
          names.push(name);
        }
        names
      }
    };

    if let Some(nc) = data.nc {
      if nc != names.len() {
        return Err(LabelError::CountMismatch {
          nc,
          names: names.len(),
        });
      }
    }

    debug!("类别名称: {:?}", names);
    Self::from_names(names)
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}
