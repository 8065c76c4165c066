// 该文件是 Yanshi （演示） 项目的一部分。
// src/model/source.rs - 模型文件来源
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;

const LOCAL_SCHEME: &str = "file";
const HUB_SCHEME: &str = "hf";

#[derive(Error, Debug)]
pub enum ModelSourceError {
  #[error("不支持的模型来源方案: {0}")]
  SchemeMismatch(String),
  #[error("模型仓库名称无效: {0}")]
  InvalidRepo(String),
  #[error("模型文件不存在: {0}")]
  FileNotFound(PathBuf),
  #[cfg(feature = "hf_hub")]
  #[error("模型下载失败: {0}")]
  HubError(#[from] hf_hub::api::sync::ApiError),
  #[cfg(not(feature = "hf_hub"))]
  #[error("未启用 hf_hub 功能, 无法下载模型仓库 {0}")]
  HubDisabled(String),
}

/// 模型文件所在位置
///
/// - `file:///path/to/dir`：本地目录
/// - `hf://owner/name` 或 `hf://owner/name?revision=main`：HuggingFace 仓库
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
  Local(PathBuf),
  Hub {
    repo: String,
    revision: Option<String>,
  },
}

impl ModelSource {
  pub fn hub(repo: impl Into<String>) -> Self {
    ModelSource::Hub {
      repo: repo.into(),
      revision: None,
    }
  }

  /// 获取模型目录中某个文件的本地路径，必要时下载
  pub fn resolve(&self, file: &str) -> Result<PathBuf, ModelSourceError> {
    match self {
      ModelSource::Local(dir) => {
        let path = dir.join(file);
        if !path.exists() {
          return Err(ModelSourceError::FileNotFound(path));
        }
        debug!("使用本地模型文件: {}", path.display());
        Ok(path)
      }
      ModelSource::Hub { repo, revision } => Self::download(repo, revision.as_deref(), file),
    }
  }

  #[cfg(feature = "hf_hub")]
  fn download(repo: &str, revision: Option<&str>, file: &str) -> Result<PathBuf, ModelSourceError> {
    use hf_hub::{Repo, RepoType, api::sync::Api};

    info!("从模型仓库 {} 获取 {}", repo, file);
    let api = Api::new()?;
    let repo = match revision {
      Some(rev) => Repo::with_revision(repo.to_string(), RepoType::Model, rev.to_string()),
      None => Repo::model(repo.to_string()),
    };
    let path = api.repo(repo).get(file)?;
    debug!("模型文件缓存路径: {}", path.display());
    Ok(path)
  }

  #[cfg(not(feature = "hf_hub"))]
  fn download(
    repo: &str,
    _revision: Option<&str>,
    file: &str,
  ) -> Result<PathBuf, ModelSourceError> {
    info!("无法从模型仓库 {} 获取 {}", repo, file);
    Err(ModelSourceError::HubDisabled(repo.to_string()))
  }
}

impl std::fmt::Display for ModelSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ModelSource::Local(dir) => write!(f, "{}://{}", LOCAL_SCHEME, dir.display()),
      ModelSource::Hub {
        repo,
        revision: Some(rev),
      } => write!(f, "{}://{}?revision={}", HUB_SCHEME, repo, rev),
      ModelSource::Hub {
        repo,
        revision: None,
      } => write!(f, "{}://{}", HUB_SCHEME, repo),
    }
  }
}

impl FromUrl for ModelSource {
  type Error = ModelSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LOCAL_SCHEME => Ok(ModelSource::Local(PathBuf::from(url.path()))),
      HUB_SCHEME => {
        let owner = url.host_str().unwrap_or_default();
        let name = url.path().trim_matches('/');
        if owner.is_empty() || name.is_empty() || name.contains('/') {
          return Err(ModelSourceError::InvalidRepo(url.to_string()));
        }
        let revision = url
          .query_pairs()
          .find(|(k, _)| k == "revision")
          .map(|(_, v)| v.into_owned());
        Ok(ModelSource::Hub {
          repo: format!("{}/{}", owner, name),
          revision,
        })
      }
      other => Err(ModelSourceError::SchemeMismatch(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(s: &str) -> Result<ModelSource, ModelSourceError> {
    ModelSource::from_url(&Url::parse(s).unwrap())
  }

  #[test]
  fn parses_local_directory() {
    assert_eq!(
      parse("file:///opt/models/yolos").unwrap(),
      ModelSource::Local(PathBuf::from("/opt/models/yolos"))
    );
  }

  #[test]
  fn parses_hub_repository() {
    assert_eq!(
      parse("hf://hustvl/yolos-tiny").unwrap(),
      ModelSource::hub("hustvl/yolos-tiny")
    );
    assert_eq!(
      parse("hf://deepset/roberta-base-squad2?revision=main").unwrap(),
      ModelSource::Hub {
        repo: "deepset/roberta-base-squad2".to_string(),
        revision: Some("main".to_string()),
      }
    );
  }

  #[test]
  fn rejects_bad_sources() {
    assert!(matches!(
      parse("s3://bucket/yolos-tiny"),
      Err(ModelSourceError::SchemeMismatch(_))
    ));
    assert!(matches!(
      parse("hf://hustvl"),
      Err(ModelSourceError::InvalidRepo(_))
    ));
  }

  #[test]
  fn missing_local_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let source = ModelSource::Local(dir.path().to_path_buf());
    assert!(matches!(
      source.resolve("model.onnx"),
      Err(ModelSourceError::FileNotFound(_))
    ));

    std::fs::write(dir.path().join("model.onnx"), b"onnx").unwrap();
    assert_eq!(
      source.resolve("model.onnx").unwrap(),
      dir.path().join("model.onnx")
    );
  }

  #[test]
  fn display_round_trips_hub_source() {
    let source = ModelSource::hub("hustvl/yolos-tiny");
    assert_eq!(source.to_string(), "hf://hustvl/yolos-tiny");
  }
}
