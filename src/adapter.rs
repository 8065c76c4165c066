// 该文件是 Yanshi （演示） 项目的一部分。
// src/adapter.rs - 推理适配层
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

use std::{sync::Arc, time::Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::decode_image,
  model::{
    DetectItem, DetectionBox, DetectionModel, ModelBuilder, QaRequest, QuestionAnsweringModel,
  },
  session::{SessionError, SessionState},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum AdapterError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[source] BoxError),
  #[error("图像解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("推理错误: {0}")]
  InferenceError(#[source] BoxError),
  #[error("阈值必须在 [0, 1] 之间, 实际为 {0}")]
  InvalidThreshold(f32),
}

impl AdapterError {
  fn inference<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    AdapterError::InferenceError(Box::new(e))
  }
}

impl<E: std::error::Error + Send + Sync + 'static> From<SessionError<E>> for AdapterError {
  fn from(err: SessionError<E>) -> Self {
    match err {
      SessionError::Factory(e) => AdapterError::ModelLoadError(Box::new(e)),
      mismatch @ SessionError::TypeMismatch { .. } => {
        AdapterError::ModelLoadError(mismatch.to_string().into())
      }
    }
  }
}

fn load<B: ModelBuilder>(
  session: &mut SessionState,
  builder: &B,
) -> Result<Arc<B::Model>, AdapterError> {
  Ok(session.get_or_build(builder)?)
}

/// 对图像字节做目标检测
///
/// 先解码再取模型：解码失败不会触碰会话中的模型。
/// 阈值在解码之后、取模型之前校验。
/// 返回结果保持模型输出的顺序。
pub fn detect<B>(
  session: &mut SessionState,
  builder: &B,
  image_bytes: &[u8],
  threshold: f32,
) -> Result<Vec<DetectionBox>, AdapterError>
where
  B: ModelBuilder,
  B::Model: DetectionModel,
{
  let image = decode_image(image_bytes)?;
  detect_image(session, builder, &image, threshold)
}

/// 对已解码的图像做目标检测，阈值须在 [0, 1] 之间
pub fn detect_image<B>(
  session: &mut SessionState,
  builder: &B,
  image: &RgbImage,
  threshold: f32,
) -> Result<Vec<DetectionBox>, AdapterError>
where
  B: ModelBuilder,
  B::Model: DetectionModel,
{
  if !(0.0..=1.0).contains(&threshold) {
    return Err(AdapterError::InvalidThreshold(threshold));
  }

  let model = load(session, builder)?;

  let now = Instant::now();
  let input = model.preprocess(image).map_err(AdapterError::inference)?;
  let output = model.forward(&input).map_err(AdapterError::inference)?;
  let target_size = (image.height(), image.width());
  let items = model
    .postprocess(output, threshold, target_size)
    .map_err(AdapterError::inference)?;
  info!(
    "检测完成，耗时: {:.2?}, 阈值 {} 下共 {} 个目标",
    now.elapsed(),
    threshold,
    items.len()
  );

  let boxes = items
    .into_iter()
    .map(|DetectItem { class_id, score, bbox }| {
      let label = model
        .label(class_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("LABEL_{}", class_id));
      debug!("  - {}: {:.4} at {:?}", label, score, bbox);
      DetectionBox { score, label, bbox }
    })
    .collect();

  Ok(boxes)
}

/// 抽取式问答，只返回得分最高的答案文本
///
/// 问题与上下文原样交给模型，不做空值检查。
pub fn answer<B>(
  session: &mut SessionState,
  builder: &B,
  question: &str,
  context: &str,
) -> Result<String, AdapterError>
where
  B: ModelBuilder,
  B::Model: QuestionAnsweringModel,
{
  let pipeline = load(session, builder)?;
  let request = QaRequest {
    question: question.to_string(),
    context: context.to_string(),
  };

  let now = Instant::now();
  let response = pipeline
    .answer(&request)
    .map_err(AdapterError::inference)?;
  info!("问答完成，耗时: {:.2?}", now.elapsed());
  debug!(
    "答案: {:?}, 分数 {:.4}, 区间 {}..{}",
    response.answer, response.score, response.start, response.end
  );

  Ok(response.answer)
}
