// 该文件是 Yanshi （演示） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::DetectionBox;

const LABEL_FONT_SIZE: f32 = 12.0;
const LABEL_OFFSET_Y: i32 = 15;
const OUTLINE_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const OUTLINE_WIDTH: i32 = 3;

// 未指定字体时依次尝试
const SYSTEM_FONT_PATHS: [&str; 6] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 标签文本，形如 `cat - 82.34`
pub fn label_text(item: &DetectionBox) -> String {
  format!("{} - {:.2}", item.label, item.score * 100.0)
}

/// 在图像上绘制检测框与标签
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  color: [u8; 3],
  outline_width: i32,
}

impl std::fmt::Debug for Draw {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Draw")
      .field("has_font", &self.font.is_some())
      .field("font_size", &self.font_size)
      .field("color", &self.color)
      .field("outline_width", &self.outline_width)
      .finish()
  }
}

impl Default for Draw {
  fn default() -> Self {
    let font = SYSTEM_FONT_PATHS
      .iter()
      .map(Path::new)
      .filter(|p| p.exists())
      .find_map(|p| match Self::load_font(p) {
        Ok(font) => {
          debug!("使用系统字体: {}", p.display());
          Some(font)
        }
        Err(e) => {
          warn!("无法加载字体 {}: {}", p.display(), e);
          None
        }
      });

    if font.is_none() {
      warn!("未找到可用字体, 只绘制检测框, 不绘制标签");
    }

    Self::with_font_option(font)
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let font = Self::load_font(path.as_ref())?;
    Ok(Self::with_font_option(Some(font)))
  }

  pub fn with_font(font: FontArc) -> Self {
    Self::with_font_option(Some(font))
  }

  /// 只绘制检测框
  pub fn without_font() -> Self {
    Self::with_font_option(None)
  }

  pub fn font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn with_font_option(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      color: OUTLINE_COLOR,
      outline_width: OUTLINE_WIDTH,
    }
  }

  fn load_font(path: &Path) -> Result<FontArc, DrawError> {
    let data = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(data)?)
  }

  /// 返回绘制后的新图像，原图保持不变
  pub fn annotate(&self, image: &RgbImage, boxes: &[DetectionBox]) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_detections_mut(&mut canvas, boxes);
    canvas
  }

  pub fn draw_detections_mut(&self, image: &mut RgbImage, boxes: &[DetectionBox]) {
    for item in boxes {
      self.draw_bbox_with_label(image, item);
    }
  }

  // 边框向内加粗；标签位于 (x_min, y_min - 15)，超出画布的部分被裁掉
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectionBox) {
    let color = Rgb(self.color);
    // 坐标先收拢到画布外一圈，画布外的边框仍落在画布外
    let margin = self.outline_width + 1;
    let clamp = |v: f32, size: u32| {
      v.round()
        .clamp(-margin as f32, (size as i32 + margin) as f32) as i32
    };
    let [x_min, y_min, x_max, y_max] = [
      clamp(item.bbox[0], image.width()),
      clamp(item.bbox[1], image.height()),
      clamp(item.bbox[2], image.width()),
      clamp(item.bbox[3], image.height()),
    ];

    let width = x_max - x_min + 1;
    let height = y_max - y_min + 1;
    for t in 0..self.outline_width {
      let (w, h) = (width - 2 * t, height - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    if let Some(font) = &self.font {
      let label = label_text(item);
      draw_text_mut(
        image,
        color,
        x_min,
        y_min - LABEL_OFFSET_Y,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}
