// 该文件是 Yanshi （演示） 项目的一部分。
// src/model/extractive_qa.rs - 抽取式问答模型 (ONNX)
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

//! 问题与上下文作为句对编码，过长的上下文按滑动窗口切分，
//! 在所有窗口中取 `p_start * p_end` 最大的区间。

use ort::{
  session::Session,
  value::{DynValue, TensorRef},
};
use parking_lot::Mutex;
use thiserror::Error;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  model::{
    ModelBuilder, QA_MODEL_ID, QaRequest, QaResponse, QuestionAnsweringModel,
    postprocess::{PostprocessError, QaWindow, best_context_span},
    source::{ModelSource, ModelSourceError},
  },
};

const QA_MODEL_FILE: &str = "model.onnx";
const QA_TOKENIZER_FILE: &str = "tokenizer.json";

const QA_MAX_SEQ_LEN: usize = 384;
const QA_DOC_STRIDE: usize = 128;
const QA_MAX_ANSWER_LEN: usize = 15;

const QA_INPUT_IDS: &str = "input_ids";
const QA_ATTENTION_MASK: &str = "attention_mask";
const QA_START_LOGITS: &str = "start_logits";
const QA_END_LOGITS: &str = "end_logits";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum QaPipelineError {
  #[error("模型来源错误: {0}")]
  SourceError(#[from] ModelSourceError),
  #[error("分词器错误: {0}")]
  TokenizerError(#[source] BoxError),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("后处理错误: {0}")]
  PostprocessError(#[from] PostprocessError),
  #[error("输出 {name} 形状无效: {shape:?}")]
  InvalidOutputShape { name: &'static str, shape: Vec<i64> },
}

pub struct QaPipeline {
  session: Mutex<Session>,
  tokenizer: Tokenizer,
  max_answer_len: usize,
}

impl std::fmt::Debug for QaPipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QaPipeline")
      .field("max_answer_len", &self.max_answer_len)
      .finish_non_exhaustive()
  }
}

#[derive(Debug, Clone)]
pub struct QaPipelineBuilder {
  source: ModelSource,
  max_seq_len: usize,
  doc_stride: usize,
  max_answer_len: usize,
}

impl Default for QaPipelineBuilder {
  fn default() -> Self {
    QaPipelineBuilder::new(ModelSource::hub(QA_MODEL_ID))
  }
}

impl FromUrl for QaPipelineBuilder {
  type Error = QaPipelineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(QaPipelineBuilder::new(ModelSource::from_url(url)?))
  }
}

impl QaPipelineBuilder {
  pub fn new(source: ModelSource) -> Self {
    QaPipelineBuilder {
      source,
      max_seq_len: QA_MAX_SEQ_LEN,
      doc_stride: QA_DOC_STRIDE,
      max_answer_len: QA_MAX_ANSWER_LEN,
    }
  }

  pub fn max_seq_len(mut self, max_seq_len: usize) -> Self {
    self.max_seq_len = max_seq_len;
    self
  }

  pub fn doc_stride(mut self, doc_stride: usize) -> Self {
    self.doc_stride = doc_stride;
    self
  }

  pub fn max_answer_len(mut self, max_answer_len: usize) -> Self {
    self.max_answer_len = max_answer_len;
    self
  }

  pub fn source(&self) -> &ModelSource {
    &self.source
  }
}

impl ModelBuilder for QaPipelineBuilder {
  const KEY: &'static str = "pipeline";
  type Model = QaPipeline;
  type Error = QaPipelineError;

  fn build(&self) -> Result<QaPipeline, QaPipelineError> {
    info!("加载问答模型: {}", self.source);
    let model_path = self.source.resolve(QA_MODEL_FILE)?;
    let tokenizer_path = self.source.resolve(QA_TOKENIZER_FILE)?;

    let mut tokenizer =
      Tokenizer::from_file(&tokenizer_path).map_err(QaPipelineError::TokenizerError)?;
    tokenizer
      .with_truncation(Some(TruncationParams {
        max_length: self.max_seq_len,
        stride: self.doc_stride,
        strategy: TruncationStrategy::OnlySecond,
        ..Default::default()
      }))
      .map_err(QaPipelineError::TokenizerError)?;
    debug!(
      "分词器: 最大长度 {}, 窗口步长 {}",
      self.max_seq_len, self.doc_stride
    );

    info!("创建 ONNX Runtime 会话: {}", model_path.display());
    let session = Session::builder()?.commit_from_file(&model_path)?;
    info!("模型加载完成");

    Ok(QaPipeline {
      session: Mutex::new(session),
      tokenizer,
      max_answer_len: self.max_answer_len,
    })
  }
}

fn extract_logits(
  value: &DynValue,
  name: &'static str,
  len: usize,
) -> Result<Vec<f32>, QaPipelineError> {
  let (shape, data) = value.try_extract_tensor::<f32>()?;
  let dims: &[i64] = shape;
  match *dims {
    [1, n] if n as usize == len => Ok(data.to_vec()),
    _ => Err(QaPipelineError::InvalidOutputShape {
      name,
      shape: dims.to_vec(),
    }),
  }
}

/// 只有第二句（上下文）中的 token 可以作为答案
fn context_mask(encoding: &Encoding) -> Vec<bool> {
  encoding
    .get_sequence_ids()
    .into_iter()
    .map(|id| id == Some(1))
    .collect()
}

impl QaPipeline {
  fn run_window(&self, encoding: &Encoding) -> Result<(Vec<f32>, Vec<f32>), QaPipelineError> {
    let len = encoding.get_ids().len();
    let ids: Vec<i64> = encoding.get_ids().iter().map(|&v| v as i64).collect();
    let mask: Vec<i64> = encoding
      .get_attention_mask()
      .iter()
      .map(|&v| v as i64)
      .collect();
    let dims = vec![1_i64, len as i64];

    let ids = TensorRef::from_array_view((dims.clone(), ids.as_slice()))?;
    let mask = TensorRef::from_array_view((dims, mask.as_slice()))?;

    let mut session = self.session.lock();
    let outputs = session.run(ort::inputs![
      QA_INPUT_IDS => ids,
      QA_ATTENTION_MASK => mask,
    ])?;
    let start = extract_logits(&outputs[QA_START_LOGITS], QA_START_LOGITS, len)?;
    let end = extract_logits(&outputs[QA_END_LOGITS], QA_END_LOGITS, len)?;
    Ok((start, end))
  }
}

impl QuestionAnsweringModel for QaPipeline {
  type Error = QaPipelineError;

  fn answer(&self, request: &QaRequest) -> Result<QaResponse, QaPipelineError> {
    let encoding = self
      .tokenizer
      .encode((request.question.as_str(), request.context.as_str()), true)
      .map_err(QaPipelineError::TokenizerError)?;

    let windows: Vec<&Encoding> = std::iter::once(&encoding)
      .chain(encoding.get_overflowing().iter())
      .collect();
    debug!("上下文切分为 {} 个窗口", windows.len());

    let mut outputs = Vec::with_capacity(windows.len());
    for window in &windows {
      let (start_logits, end_logits) = self.run_window(window)?;
      outputs.push((start_logits, end_logits, context_mask(window)));
    }

    let best = best_context_span(
      windows
        .iter()
        .zip(&outputs)
        .map(|(window, (start_logits, end_logits, mask))| QaWindow {
          start_logits: start_logits.as_slice(),
          end_logits: end_logits.as_slice(),
          context_mask: mask.as_slice(),
          offsets: window.get_offsets(),
        }),
      self.max_answer_len,
    )?;

    let Some((span, start, end)) = best else {
      warn!("上下文为空, 没有可用的答案区间");
      return Ok(QaResponse::default());
    };

    let answer = request
      .context
      .get(start..end)
      .unwrap_or_default()
      .to_string();

    Ok(QaResponse {
      answer,
      score: span.score,
      start,
      end,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_defaults_follow_squad_pipeline() {
    let builder = QaPipelineBuilder::default();
    assert_eq!(builder.source(), &ModelSource::hub(QA_MODEL_ID));
    assert_eq!(builder.max_seq_len, 384);
    assert_eq!(builder.doc_stride, 128);
    assert_eq!(builder.max_answer_len, 15);
  }

  #[test]
  fn missing_local_model_fails_to_build() {
    let dir = tempfile::tempdir().unwrap();
    let builder = QaPipelineBuilder::new(ModelSource::Local(dir.path().to_path_buf()));
    assert!(matches!(
      builder.build(),
      Err(QaPipelineError::SourceError(ModelSourceError::FileNotFound(_)))
    ));
  }
}
