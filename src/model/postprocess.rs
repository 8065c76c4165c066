// 该文件是 Yanshi （演示） 项目的一部分。
// src/model/postprocess.rs - 模型输出后处理
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

use thiserror::Error;
use tracing::debug;

use crate::model::DetectItem;

/// 非上下文 token 的屏蔽值
const MASKED_LOGIT: f32 = -10000.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PostprocessError {
  #[error("{name} 输出大小不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

fn check_len(name: &'static str, data: &[f32], expected: usize) -> Result<(), PostprocessError> {
  if data.len() != expected {
    return Err(PostprocessError::ShapeMismatch {
      name,
      expected,
      actual: data.len(),
    });
  }
  Ok(())
}

/// DETR 系列检测头的后处理
///
/// `logits` 形状为 `[num_queries, num_logits]`，最后一列是“无目标”类别；
/// `pred_boxes` 形状为 `[num_queries, 4]`，为归一化的 (cx, cy, w, h)。
/// 只保留分数严格大于 `threshold` 的结果，坐标缩放到 `target_size` (高, 宽)。
pub fn detr_postprocess(
  logits: &[f32],
  pred_boxes: &[f32],
  num_queries: usize,
  num_logits: usize,
  threshold: f32,
  target_size: (u32, u32),
) -> Result<Vec<DetectItem>, PostprocessError> {
  check_len("logits", logits, num_queries * num_logits)?;
  check_len("pred_boxes", pred_boxes, num_queries * 4)?;
  if num_logits < 2 {
    return Ok(Vec::new());
  }

  let (img_h, img_w) = (target_size.0 as f32, target_size.1 as f32);
  let num_classes = num_logits.saturating_sub(1);
  let mut items = Vec::new();

  for (row, bbox) in logits
    .chunks_exact(num_logits)
    .zip(pred_boxes.chunks_exact(4))
  {
    let probs = softmax(row);
    let Some((class_id, &score)) = probs[..num_classes]
      .iter()
      .enumerate()
      .max_by(|a, b| a.1.total_cmp(b.1))
    else {
      continue;
    };

    if score <= threshold {
      continue;
    }

    let (cx, cy, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [
        (cx - 0.5 * w) * img_w,
        (cy - 0.5 * h) * img_h,
        (cx + 0.5 * w) * img_w,
        (cy + 0.5 * h) * img_h,
      ],
    });
  }

  debug!("阈值 {} 下保留 {} / {} 个查询", threshold, items.len(), num_queries);
  Ok(items)
}

/// 抽取式问答的答案区间，token 下标闭区间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
  pub start: usize,
  pub end: usize,
  pub score: f32,
}

/// 在上下文 token 中寻找 `p_start * p_end` 最大的区间
///
/// 非上下文 token 的 logit 先被屏蔽再做 softmax；区间需满足
/// `start <= end` 且长度不超过 `max_answer_len`。没有上下文 token 时返回 `None`。
pub fn best_span(
  start_logits: &[f32],
  end_logits: &[f32],
  context_mask: &[bool],
  max_answer_len: usize,
) -> Result<Option<Span>, PostprocessError> {
  check_len("end_logits", end_logits, start_logits.len())?;
  if context_mask.len() != start_logits.len() {
    return Err(PostprocessError::ShapeMismatch {
      name: "context_mask",
      expected: start_logits.len(),
      actual: context_mask.len(),
    });
  }

  let mask = |logits: &[f32]| -> Vec<f32> {
    logits
      .iter()
      .zip(context_mask)
      .map(|(&l, &ctx)| if ctx { l } else { MASKED_LOGIT })
      .collect()
  };
  let p_start = softmax(&mask(start_logits));
  let p_end = softmax(&mask(end_logits));

  let mut best: Option<Span> = None;
  for start in (0..context_mask.len()).filter(|&i| context_mask[i]) {
    let last = (start + max_answer_len).min(context_mask.len());
    for end in (start..last).filter(|&j| context_mask[j]) {
      let score = p_start[start] * p_end[end];
      if best.is_none_or(|b| score > b.score) {
        best = Some(Span { start, end, score });
      }
    }
  }

  Ok(best)
}

/// 一个滑动窗口的模型输出与 token 信息
#[derive(Debug, Clone, Copy)]
pub struct QaWindow<'a> {
  pub start_logits: &'a [f32],
  pub end_logits: &'a [f32],
  pub context_mask: &'a [bool],
  /// 每个 token 在上下文中的字节区间
  pub offsets: &'a [(usize, usize)],
}

/// 在所有窗口中取分数最高的区间，连同它在上下文中的字节范围 `start..end` 一起返回
///
/// 分数相同时保留先出现的窗口。没有任何上下文 token 时返回 `None`。
pub fn best_context_span<'a>(
  windows: impl IntoIterator<Item = QaWindow<'a>>,
  max_answer_len: usize,
) -> Result<Option<(Span, usize, usize)>, PostprocessError> {
  let mut best: Option<(Span, usize, usize)> = None;
  for (index, window) in windows.into_iter().enumerate() {
    if window.offsets.len() != window.start_logits.len() {
      return Err(PostprocessError::ShapeMismatch {
        name: "offsets",
        expected: window.start_logits.len(),
        actual: window.offsets.len(),
      });
    }

    let span = best_span(
      window.start_logits,
      window.end_logits,
      window.context_mask,
      max_answer_len,
    )?;
    let Some(span) = span else {
      continue;
    };
    if best.is_none_or(|(b, _, _)| span.score > b.score) {
      debug!("窗口 {} 的区间 {}..={} 分数 {:.4}", index, span.start, span.end, span.score);
      best = Some((span, window.offsets[span.start].0, window.offsets[span.end].1));
    }
  }
  Ok(best)
}

#[cfg(test)]
mod tests {
  use super::*;

  const NO_OBJECT: f32 = 0.0;

  /// 三个查询，两个类别 + 无目标
  fn sample() -> (Vec<f32>, Vec<f32>) {
    let logits = vec![
      4.0, 0.0, NO_OBJECT, // 强烈的类别 0
      0.0, 1.0, NO_OBJECT, // 较弱的类别 1
      -3.0, -3.0, 5.0, // 几乎没有目标
    ];
    let boxes = vec![
      0.5, 0.5, 0.2, 0.4, //
      0.25, 0.25, 0.1, 0.1, //
      0.9, 0.9, 0.1, 0.1,
    ];
    (logits, boxes)
  }

  #[test]
  fn softmax_sums_to_one() {
    let probs = softmax(&[1.0, 2.0, 3.0]);
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    assert!(probs[2] > probs[1] && probs[1] > probs[0]);
  }

  #[test]
  fn boxes_are_scaled_to_target_size() {
    let (logits, boxes) = sample();
    let items = detr_postprocess(&logits, &boxes, 3, 3, 0.9, (200, 100)).unwrap();

    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.class_id, 0);
    let expected = [40.0, 60.0, 60.0, 140.0];
    for (a, b) in item.bbox.iter().zip(expected) {
      assert!((a - b).abs() < 1e-4, "{:?}", item.bbox);
    }
  }

  #[test]
  fn threshold_is_monotonic() {
    let (logits, boxes) = sample();
    let mut previous = usize::MAX;
    for step in 0..=100 {
      let threshold = step as f32 / 100.0;
      let count = detr_postprocess(&logits, &boxes, 3, 3, threshold, (10, 10))
        .unwrap()
        .len();
      assert!(count <= previous, "threshold {}", threshold);
      previous = count;
    }
  }

  #[test]
  fn threshold_edges_are_valid() {
    let (logits, boxes) = sample();
    let all = detr_postprocess(&logits, &boxes, 3, 3, 0.0, (10, 10)).unwrap();
    assert_eq!(all.len(), 3);
    let none = detr_postprocess(&logits, &boxes, 3, 3, 1.0, (10, 10)).unwrap();
    assert!(none.is_empty());
  }

  #[test]
  fn shape_mismatch_is_reported() {
    let err = detr_postprocess(&[0.0; 5], &[0.0; 8], 2, 3, 0.5, (1, 1)).unwrap_err();
    assert_eq!(
      err,
      PostprocessError::ShapeMismatch {
        name: "logits",
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn best_span_ignores_question_tokens() {
    // [CLS] q q [SEP] c c c [SEP]
    let mask = [false, false, false, false, true, true, true, false];
    let start = [9.0, 9.0, 9.0, 0.0, 1.0, 5.0, 0.0, 0.0];
    let end = [9.0, 0.0, 9.0, 0.0, 0.0, 1.0, 6.0, 0.0];

    let span = best_span(&start, &end, &mask, 15).unwrap().unwrap();
    assert_eq!((span.start, span.end), (5, 6));
    assert!(span.score > 0.0 && span.score <= 1.0);
  }

  #[test]
  fn best_span_respects_max_answer_len() {
    let mask = [true; 6];
    let start = [6.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let end = [0.0, 0.0, 0.0, 0.0, 0.0, 5.0];

    let span = best_span(&start, &end, &mask, 3).unwrap().unwrap();
    assert_eq!(span.start, 0);
    assert!(span.end <= 2);
  }

  #[test]
  fn best_span_never_ends_before_start() {
    let mask = [true; 4];
    let start = [0.0, 0.0, 0.0, 6.0];
    let end = [6.0, 0.0, 0.0, 0.0];

    let span = best_span(&start, &end, &mask, 15).unwrap().unwrap();
    assert!(span.start <= span.end);
  }

  #[test]
  fn best_span_without_context_is_none() {
    let mask = [false; 3];
    assert_eq!(best_span(&[1.0; 3], &[1.0; 3], &mask, 15).unwrap(), None);
  }

  #[test]
  fn later_window_can_win() {
    let mask = [false, false, true, true];
    let weak = ([0.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 1.0]);
    let strong = ([0.0, 0.0, 5.0, 0.0], [0.0, 0.0, 5.0, 0.0]);
    let first_offsets = [(0, 0), (0, 0), (0, 4), (5, 9)];
    let second_offsets = [(0, 0), (0, 0), (10, 14), (15, 20)];

    let windows = [
      QaWindow {
        start_logits: &weak.0,
        end_logits: &weak.1,
        context_mask: &mask,
        offsets: &first_offsets,
      },
      QaWindow {
        start_logits: &strong.0,
        end_logits: &strong.1,
        context_mask: &mask,
        offsets: &second_offsets,
      },
    ];

    let (span, start, end) = best_context_span(windows, 15).unwrap().unwrap();
    assert_eq!((span.start, span.end), (2, 2));
    assert_eq!((start, end), (10, 14));
  }

  #[test]
  fn offsets_are_context_bytes() {
    let context = "café 很好 ok";
    let window = QaWindow {
      start_logits: &[0.0, 0.0, 6.0, 0.0],
      end_logits: &[0.0, 0.0, 6.0, 0.0],
      context_mask: &[false, true, true, true],
      offsets: &[(0, 0), (0, 5), (6, 12), (13, 15)],
    };

    let (_, start, end) = best_context_span([window], 15).unwrap().unwrap();
    assert_eq!((start, end), (6, 12));
    assert_eq!(&context[start..end], "很好");
  }

  #[test]
  fn no_context_tokens_means_no_span() {
    let window = QaWindow {
      start_logits: &[1.0, 2.0],
      end_logits: &[1.0, 2.0],
      context_mask: &[false, false],
      offsets: &[(0, 0), (0, 0)],
    };
    assert_eq!(best_context_span([window], 15).unwrap(), None);
    assert_eq!(best_context_span([], 15).unwrap(), None);
  }

  #[test]
  fn offsets_must_match_logits() {
    let window = QaWindow {
      start_logits: &[1.0, 2.0],
      end_logits: &[1.0, 2.0],
      context_mask: &[true, true],
      offsets: &[(0, 1)],
    };
    assert!(matches!(
      best_context_span([window], 15),
      Err(PostprocessError::ShapeMismatch { name: "offsets", .. })
    ));
  }
}
