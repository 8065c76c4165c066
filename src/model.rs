// 该文件是 Yanshi （演示） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;

/// 目标检测默认使用的模型
pub const DETECTION_MODEL_ID: &str = "hustvl/yolos-tiny";
/// 问答默认使用的模型
pub const QA_MODEL_ID: &str = "deepset/roberta-base-squad2";

/// 模型构建器，作为会话缓存的工厂
pub trait ModelBuilder {
  /// 会话缓存中的键，同一种模型共用一个键
  const KEY: &'static str;
  type Model: Send + Sync + 'static;
  type Error: std::error::Error + Send + Sync + 'static;

  fn build(&self) -> Result<Self::Model, Self::Error>;
}

pub trait DetectionModel {
  type Input;
  type Output;
  type Error: std::error::Error + Send + Sync + 'static;

  fn preprocess(&self, image: &RgbImage) -> Result<Self::Input, Self::Error>;
  fn forward(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
  /// `target_size` 为原图的 (高, 宽)，输出坐标按此缩放
  fn postprocess(
    &self,
    output: Self::Output,
    threshold: f32,
    target_size: (u32, u32),
  ) -> Result<Vec<DetectItem>, Self::Error>;
  fn label(&self, class_id: u32) -> Option<&str>;
}

pub trait QuestionAnsweringModel {
  type Error: std::error::Error + Send + Sync + 'static;

  fn answer(&self, request: &QaRequest) -> Result<QaResponse, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
  pub score: f32,
  pub label: String,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QaRequest {
  pub question: String,
  pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaResponse {
  pub answer: String,
  pub score: f32,
  /// 答案在上下文中的字节区间
  pub start: usize,
  pub end: usize,
}

pub mod labels;
pub mod postprocess;
pub mod source;

pub use self::labels::{Id2Label, LabelError};
pub use self::source::{ModelSource, ModelSourceError};

#[cfg(feature = "onnx")]
mod extractive_qa;
#[cfg(feature = "onnx")]
pub use self::extractive_qa::{QaPipeline, QaPipelineBuilder, QaPipelineError};

#[cfg(feature = "onnx")]
mod yolos;
#[cfg(feature = "onnx")]
pub use self::yolos::{Yolos, YolosBuilder, YolosError, YolosOutput};
