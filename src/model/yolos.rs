// 该文件是 Yanshi （演示） 项目的一部分。
// src/model/yolos.rs - YOLOS 目标检测模型 (ONNX)
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
use ort::{
  session::Session,
  value::{DynValue, TensorRef},
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  frame::{IMAGENET_MEAN, IMAGENET_STD, NchwTensor, resize_shortest_edge},
  model::{
    DETECTION_MODEL_ID, DetectItem, DetectionModel, ModelBuilder,
    labels::{Id2Label, LabelError},
    postprocess::{PostprocessError, detr_postprocess},
    source::{ModelSource, ModelSourceError},
  },
};

const YOLOS_MODEL_FILE: &str = "model.onnx";
const YOLOS_CONFIG_FILE: &str = "config.json";
const YOLOS_SHORTEST_EDGE: u32 = 512;
const YOLOS_LONGEST_EDGE: u32 = 1333;

const YOLOS_INPUT: &str = "pixel_values";
const YOLOS_LOGITS: &str = "logits";
const YOLOS_BOXES: &str = "pred_boxes";

#[derive(Error, Debug)]
pub enum YolosError {
  #[error("模型来源错误: {0}")]
  SourceError(#[from] ModelSourceError),
  #[error("标签配置错误: {0}")]
  LabelError(#[from] LabelError),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("后处理错误: {0}")]
  PostprocessError(#[from] PostprocessError),
  #[error("输出 {name} 形状无效: {shape:?}")]
  InvalidOutputShape { name: &'static str, shape: Vec<i64> },
}

/// YOLOS 原始输出，`logits` 为 `[1, Q, C + 1]`，`pred_boxes` 为 `[1, Q, 4]`
#[derive(Debug, Clone)]
pub struct YolosOutput {
  logits: Vec<f32>,
  pred_boxes: Vec<f32>,
  num_queries: usize,
  num_logits: usize,
}

pub struct Yolos {
  session: Mutex<Session>,
  labels: Id2Label,
  shortest_edge: u32,
  longest_edge: u32,
}

impl std::fmt::Debug for Yolos {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Yolos")
      .field("labels", &self.labels.len())
      .field("shortest_edge", &self.shortest_edge)
      .field("longest_edge", &self.longest_edge)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone)]
pub struct YolosBuilder {
  source: ModelSource,
  shortest_edge: u32,
  longest_edge: u32,
}

impl Default for YolosBuilder {
  fn default() -> Self {
    YolosBuilder::new(ModelSource::hub(DETECTION_MODEL_ID))
  }
}

impl FromUrl for YolosBuilder {
  type Error = YolosError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(YolosBuilder::new(ModelSource::from_url(url)?))
  }
}

impl YolosBuilder {
  pub fn new(source: ModelSource) -> Self {
    YolosBuilder {
      source,
      shortest_edge: YOLOS_SHORTEST_EDGE,
      longest_edge: YOLOS_LONGEST_EDGE,
    }
  }

  pub fn edges(mut self, shortest: u32, longest: u32) -> Self {
    self.shortest_edge = shortest;
    self.longest_edge = longest;
    self
  }

  pub fn source(&self) -> &ModelSource {
    &self.source
  }
}

impl ModelBuilder for YolosBuilder {
  const KEY: &'static str = "model";
  type Model = Yolos;
  type Error = YolosError;

  fn build(&self) -> Result<Yolos, YolosError> {
    info!("加载检测模型: {}", self.source);
    let model_path = self.source.resolve(YOLOS_MODEL_FILE)?;
    let config_path = self.source.resolve(YOLOS_CONFIG_FILE)?;

    let labels = Id2Label::from_config_file(&config_path)?;
    debug!("类别数量: {}", labels.len());

    info!("创建 ONNX Runtime 会话: {}", model_path.display());
    let session = Session::builder()?.commit_from_file(&model_path)?;
    info!("模型加载完成");

    Ok(Yolos {
      session: Mutex::new(session),
      labels,
      shortest_edge: self.shortest_edge,
      longest_edge: self.longest_edge,
    })
  }
}

// 取出 [1, Q, N] 形状的输出，返回 (数据, Q, N)
fn extract_3d(
  value: &DynValue,
  name: &'static str,
) -> Result<(Vec<f32>, usize, usize), YolosError> {
  let (shape, data) = value.try_extract_tensor::<f32>()?;
  let dims: &[i64] = shape;
  match *dims {
    [1, q, n] if q >= 0 && n >= 0 => Ok((data.to_vec(), q as usize, n as usize)),
    _ => {
      error!("输出 {} 形状无效: {:?}", name, dims);
      Err(YolosError::InvalidOutputShape {
        name,
        shape: dims.to_vec(),
      })
    }
  }
}

impl DetectionModel for Yolos {
  type Input = NchwTensor;
  type Output = YolosOutput;
  type Error = YolosError;

  fn preprocess(&self, image: &RgbImage) -> Result<NchwTensor, YolosError> {
    let resized = resize_shortest_edge(image, self.shortest_edge, self.longest_edge);
    debug!(
      "预处理: {}x{} -> {}x{}",
      image.width(),
      image.height(),
      resized.width(),
      resized.height()
    );
    Ok(NchwTensor::from_rgb_image(&resized, IMAGENET_MEAN, IMAGENET_STD))
  }

  fn forward(&self, input: &NchwTensor) -> Result<YolosOutput, YolosError> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let tensor = TensorRef::from_array_view((dims, input.as_slice()))?;

    let mut session = self.session.lock();
    let outputs = session.run(ort::inputs![YOLOS_INPUT => tensor])?;

    let (logits, num_queries, num_logits) = extract_3d(&outputs[YOLOS_LOGITS], YOLOS_LOGITS)?;
    let (pred_boxes, box_queries, box_dims) = extract_3d(&outputs[YOLOS_BOXES], YOLOS_BOXES)?;
    if box_queries != num_queries || box_dims != 4 {
      return Err(YolosError::InvalidOutputShape {
        name: YOLOS_BOXES,
        shape: vec![1, box_queries as i64, box_dims as i64],
      });
    }
    debug!("模型输出: {} 个查询, {} 个 logit", num_queries, num_logits);

    Ok(YolosOutput {
      logits,
      pred_boxes,
      num_queries,
      num_logits,
    })
  }

  fn postprocess(
    &self,
    output: YolosOutput,
    threshold: f32,
    target_size: (u32, u32),
  ) -> Result<Vec<DetectItem>, YolosError> {
    Ok(detr_postprocess(
      &output.logits,
      &output.pred_boxes,
      output.num_queries,
      output.num_logits,
      threshold,
      target_size,
    )?)
  }

  fn label(&self, class_id: u32) -> Option<&str> {
    self.labels.get(class_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_defaults_to_hub_model() {
    let builder = YolosBuilder::default();
    assert_eq!(builder.source(), &ModelSource::hub(DETECTION_MODEL_ID));
    assert_eq!(builder.shortest_edge, 512);
    assert_eq!(builder.longest_edge, 1333);
  }

  #[test]
  fn missing_local_model_fails_to_build() {
    let dir = tempfile::tempdir().unwrap();
    let builder = YolosBuilder::new(ModelSource::Local(dir.path().to_path_buf()));
    assert!(matches!(
      builder.build(),
      Err(YolosError::SourceError(ModelSourceError::FileNotFound(_)))
    ));
  }
}
