// 该文件是 Yanshi （演示） 项目的一部分。
// src/model/labels.rs - 类别标签映射
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

use std::{collections::BTreeMap, path::Path};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("配置中缺少 id2label")]
  MissingId2Label,
  #[error("无效的类别编号: {0}")]
  InvalidId(String),
}

/// 类别编号到名称的映射，对应 `config.json` 中的 `id2label`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id2Label {
  labels: BTreeMap<u32, String>,
}

impl Id2Label {
  pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_config_json(&content)
  }

  pub fn from_config_json(content: &str) -> Result<Self, LabelError> {
    let config: Value = serde_json::from_str(content)?;
    let map = config
      .get("id2label")
      .and_then(Value::as_object)
      .ok_or(LabelError::MissingId2Label)?;

    let mut labels = BTreeMap::new();
    for (id, name) in map {
      let id = id
        .parse::<u32>()
        .map_err(|_| LabelError::InvalidId(id.clone()))?;
      let name = match name {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      labels.insert(id, name);
    }

    debug!("加载 {} 个类别标签", labels.len());
    Ok(Id2Label { labels })
  }

  pub fn get(&self, id: u32) -> Option<&str> {
    self.labels.get(&id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_id2label_from_config() {
    let config = r#"{
      "architectures": ["YolosForObjectDetection"],
      "id2label": {"0": "N/A", "1": "person", "17": "cat"},
      "num_labels": 91
    }"#;

    let labels = Id2Label::from_config_json(config).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(17), Some("cat"));
    assert_eq!(labels.get(1), Some("person"));
    assert_eq!(labels.get(2), None);
  }

  #[test]
  fn rejects_config_without_labels() {
    let err = Id2Label::from_config_json(r#"{"num_labels": 2}"#).unwrap_err();
    assert!(matches!(err, LabelError::MissingId2Label));
  }

  #[test]
  fn rejects_non_numeric_ids() {
    let err = Id2Label::from_config_json(r#"{"id2label": {"cat": "cat"}}"#).unwrap_err();
    assert!(matches!(err, LabelError::InvalidId(ref id) if id == "cat"));
  }
}
