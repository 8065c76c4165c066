// 该文件是 Yanshi （演示） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectionBox,
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 绘制检测结果并保存为图像文件
///
/// 开启 `record` 时，在同名 `.txt` 文件中逐行记录
/// `label, score, x_min, y_min, x_max, y_max`。
#[derive(Debug)]
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
  record: bool,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(uri.path(), Draw::default()))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>, draw: Draw) -> Self {
    SaveImageFileOutput {
      path: path.as_ref().to_path_buf(),
      draw,
      record: false,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }

  fn save_record(&self, result: &[DetectionBox]) -> Result<(), SaveImageFileError> {
    let records: Vec<String> = result
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          item.label, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect();
    let path = self.path.with_extension("txt");
    std::fs::write(&path, records.join("\n"))?;
    info!("保存检测记录到文件: {}", path.display());
    Ok(())
  }
}

impl Render<RgbImage, [DetectionBox]> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &[DetectionBox]) -> Result<(), Self::Error> {
    let image = self.draw.annotate(frame, result);
    self.save_image(&image)?;
    if self.record {
      self.save_record(result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("v4l:///dev/video0").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn writes_annotated_image_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let output = SaveImageFileOutput::new(&path, Draw::without_font()).with_record(true);

    let frame = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
    let boxes = [DetectionBox {
      score: 0.5,
      label: "cat".to_string(),
      bbox: [2.0, 2.0, 10.0, 10.0],
    }];
    output.render_result(&frame, &boxes[..]).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.get_pixel(2, 5), &Rgb([0, 0, 255]));
    assert_eq!(frame.get_pixel(2, 5), &Rgb([255, 255, 255]));

    let record = std::fs::read_to_string(path.with_extension("txt")).unwrap();
    assert_eq!(record, "cat, 0.5000, 2.00, 2.00, 10.00, 10.00");
  }
}
