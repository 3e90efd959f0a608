// 该文件是 Kanjian （看见） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod config;
pub mod frame;
pub mod input;
pub mod labels;
pub mod model;
pub mod output;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将命令行参数解析为 URL：带方案的字符串原样解析，否则视为本地文件路径
pub fn parse_url_or_path(value: &str, default_scheme: &str) -> Result<url::Url, url::ParseError> {
  match url::Url::parse(value) {
    // Windows 盘符（如 C:\）会被识别为单字母方案
    Ok(url) if url.scheme().len() > 1 => Ok(url),
    _ => {
      let path = std::path::Path::new(value);
      let absolute = if path.is_absolute() {
        path.to_path_buf()
      } else {
        std::env::current_dir()
          .map(|dir| dir.join(path))
          .unwrap_or_else(|_| path.to_path_buf())
      };
      let mut url = url::Url::parse(&format!("{}:///", default_scheme))?;
      // `#`、`?` 与 `%` 属于文件名本身
      url.set_path(&absolute.to_string_lossy().replace('%', "%25"));
      Ok(url)
    }
  }
}

/// 取出 URL 中的本地路径部分，并还原百分号编码
pub fn url_path(url: &url::Url) -> std::path::PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => std::path::PathBuf::from(path.into_owned()),
    Err(_) => std::path::PathBuf::from(url.path()),
  }
}
