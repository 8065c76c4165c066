// 该文件是 Yanshi （演示） 项目的一部分。
// src/demo.rs - 三个演示流程
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

//! 每次交互都从头执行一遍对应流程；缺少输入时什么也不做。

use std::ops::RangeInclusive;

use clap::ValueEnum;
use image::RgbImage;
use tracing::{debug, info};

use crate::{
  adapter::{self, AdapterError},
  frame::decode_image,
  model::{DetectionBox, DetectionModel, ModelBuilder, QuestionAnsweringModel},
  output::Draw,
  session::SessionState,
};

pub const THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const THRESHOLD_STEP: f32 = 0.01;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

pub const NUMBER_RANGE: RangeInclusive<u8> = 1..=10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Color {
  #[default]
  Rojo,
  Azul,
  Verde,
}

impl std::fmt::Display for Color {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Color::Rojo => "Rojo",
      Color::Azul => "Azul",
      Color::Verde => "Verde",
    };
    f.write_str(name)
  }
}

/// 纯控件回显，不涉及模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceDemo {
  pub color: Color,
  pub number: u8,
  pub clicked: bool,
}

impl PreferenceDemo {
  pub const TITLE: &'static str = "Ejemplo con Streamlit";

  pub fn new(color: Color, number: u8, clicked: bool) -> Self {
    let number = number.clamp(*NUMBER_RANGE.start(), *NUMBER_RANGE.end());
    PreferenceDemo {
      color,
      number,
      clicked,
    }
  }

  pub fn render(&self) -> Vec<String> {
    let mut lines = vec![
      "Selecciona tus preferencias:".to_string(),
      format!("Has elegido el color: {}", self.color),
      format!("Número seleccionado: {}", self.number),
    ];
    if self.clicked {
      lines.push("¡Botón presionado!".to_string());
    }
    lines
  }
}

/// 拍照/上传 → 检测 → 画框
#[derive(Debug)]
pub struct DetectionDemo<B> {
  builder: B,
  draw: Draw,
}

impl<B> DetectionDemo<B>
where
  B: ModelBuilder,
  B::Model: DetectionModel,
{
  pub const TITLE: &'static str = "Object Detection";

  pub fn new(builder: B, draw: Draw) -> Self {
    DetectionDemo { builder, draw }
  }

  pub fn builder(&self) -> &B {
    &self.builder
  }

  pub fn draw(&self) -> &Draw {
    &self.draw
  }

  /// 解码并检测，返回原图与检测框；还没有图像时返回 `Ok(None)`
  pub fn detect(
    &self,
    session: &mut SessionState,
    image: Option<&[u8]>,
    threshold: f32,
  ) -> Result<Option<(RgbImage, Vec<DetectionBox>)>, AdapterError> {
    let Some(bytes) = image else {
      debug!("尚未提供图像, 跳过检测");
      return Ok(None);
    };

    let original = decode_image(bytes)?;
    let boxes = adapter::detect_image(session, &self.builder, &original, threshold)?;
    Ok(Some((original, boxes)))
  }

  /// 返回画好检测框的图像副本
  pub fn run(
    &self,
    session: &mut SessionState,
    image: Option<&[u8]>,
    threshold: f32,
  ) -> Result<Option<RgbImage>, AdapterError> {
    let Some((original, boxes)) = self.detect(session, image, threshold)? else {
      return Ok(None);
    };
    info!("在图像上绘制 {} 个检测框", boxes.len());
    Ok(Some(self.draw.annotate(&original, &boxes)))
  }
}

/// 上下文 + 问题 → 答案
#[derive(Debug)]
pub struct QaDemo<B> {
  builder: B,
}

impl<B> QaDemo<B>
where
  B: ModelBuilder,
  B::Model: QuestionAnsweringModel,
{
  pub const TITLE: &'static str = "Question and answers";

  pub fn new(builder: B) -> Self {
    QaDemo { builder }
  }

  /// 未按下按钮时返回 `Ok(None)`
  pub fn run(
    &self,
    session: &mut SessionState,
    pressed: bool,
    question: &str,
    context: &str,
  ) -> Result<Option<String>, AdapterError> {
    if !pressed {
      return Ok(None);
    }
    let answer = adapter::answer(session, &self.builder, question, context)?;
    Ok(Some(format!("The answer is: {}", answer)))
  }
}

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, io::Cursor};

  use image::{ImageFormat, Rgb};

  use super::*;
  use crate::model::{DetectItem, QaRequest, QaResponse};

  struct OneCat;

  impl DetectionModel for OneCat {
    type Input = ();
    type Output = ();
    type Error = Infallible;

    fn preprocess(&self, _image: &RgbImage) -> Result<(), Infallible> {
      Ok(())
    }

    fn forward(&self, _input: &()) -> Result<(), Infallible> {
      Ok(())
    }

    fn postprocess(
      &self,
      _output: (),
      threshold: f32,
      _target_size: (u32, u32),
    ) -> Result<Vec<DetectItem>, Infallible> {
      let item = DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [1.0, 1.0, 6.0, 6.0],
      };
      Ok(if item.score > threshold { vec![item] } else { vec![] })
    }

    fn label(&self, _class_id: u32) -> Option<&str> {
      Some("cat")
    }
  }

  struct OneCatBuilder;

  impl ModelBuilder for OneCatBuilder {
    const KEY: &'static str = "model";
    type Model = OneCat;
    type Error = Infallible;

    fn build(&self) -> Result<OneCat, Infallible> {
      Ok(OneCat)
    }
  }

  struct Constant;

  impl QuestionAnsweringModel for Constant {
    type Error = Infallible;

    fn answer(&self, _request: &QaRequest) -> Result<QaResponse, Infallible> {
      Ok(QaResponse {
        answer: "Madrid".to_string(),
        ..Default::default()
      })
    }
  }

  struct ConstantBuilder;

  impl ModelBuilder for ConstantBuilder {
    const KEY: &'static str = "pipeline";
    type Model = Constant;
    type Error = Infallible;

    fn build(&self) -> Result<Constant, Infallible> {
      Ok(Constant)
    }
  }

  #[test]
  fn preferences_echo_widget_values() {
    let demo = PreferenceDemo::new(Color::Azul, 7, false);
    assert_eq!(
      demo.render(),
      [
        "Selecciona tus preferencias:",
        "Has elegido el color: Azul",
        "Número seleccionado: 7",
      ]
    );

    let clicked = PreferenceDemo::new(Color::Verde, 42, true);
    assert_eq!(clicked.number, 10);
    assert_eq!(clicked.render().last().unwrap(), "¡Botón presionado!");
    assert_eq!(PreferenceDemo::new(Color::Rojo, 0, false).number, 1);
  }

  #[test]
  fn detection_without_image_is_a_no_op() {
    let demo = DetectionDemo::new(OneCatBuilder, Draw::without_font());
    let mut session = SessionState::new();

    let result = demo.run(&mut session, None, DEFAULT_THRESHOLD).unwrap();
    assert!(result.is_none());
    assert!(session.is_empty());
  }

  #[test]
  fn detection_draws_on_a_copy() {
    let demo = DetectionDemo::new(OneCatBuilder, Draw::without_font());
    let mut session = SessionState::new();

    let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();

    let annotated = demo.run(&mut session, Some(bytes.as_slice()), 0.5).unwrap().unwrap();
    assert_eq!(annotated.get_pixel(1, 3), &Rgb([0, 0, 255]));

    let untouched = demo.run(&mut session, Some(bytes.as_slice()), 0.95).unwrap().unwrap();
    assert_eq!(untouched, image);
    assert_eq!(session.len(), 1);
  }

  #[test]
  fn detection_decodes_before_checking_threshold() {
    let demo = DetectionDemo::new(OneCatBuilder, Draw::without_font());
    let mut session = SessionState::new();

    let err = demo.detect(&mut session, Some(&b"junk"[..]), 1.5).unwrap_err();
    assert!(matches!(err, AdapterError::DecodeError(_)));

    let mut bytes = Vec::new();
    RgbImage::new(4, 4)
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    let err = demo.detect(&mut session, Some(bytes.as_slice()), 1.5).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidThreshold(_)));
    assert!(session.is_empty());
  }

  #[test]
  fn qa_runs_only_when_pressed() {
    let demo = QaDemo::new(ConstantBuilder);
    let mut session = SessionState::new();

    assert_eq!(demo.run(&mut session, false, "q", "c").unwrap(), None);
    assert!(session.is_empty());

    assert_eq!(
      demo.run(&mut session, true, "", "").unwrap().as_deref(),
      Some("The answer is: Madrid")
    );
  }
}
