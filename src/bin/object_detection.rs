// 该文件是 Yanshi （演示） 项目的一部分。
// src/bin/object_detection.rs - 目标检测演示
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use yanshi::{
  FromUrl,
  demo::{DEFAULT_THRESHOLD, DetectionDemo},
  input::InputWrapper,
  model::YolosBuilder,
  output::{Draw, Render, SaveImageFileOutput},
  session::SessionRegistry,
};

/// 上传或拍摄一张图像，检测其中的目标并画框
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，`hf://owner/name` 或 `file:///path/to/dir`
  #[arg(long, value_name = "MODEL", default_value = "hf://hustvl/yolos-tiny")]
  pub model: Url,
  /// 输入来源，`image:///path/to/image.jpg` 或 `v4l:///dev/video0`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，`image:///path/to/output.png`
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: f32,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<std::path::PathBuf>,
  /// 同时保存检测记录
  #[arg(long)]
  pub record: bool,
}

fn main() -> Result<()> {
  yanshi::init_tracing();

  let args = Args::parse();

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)
      .with_context(|| format!("无法加载字体 {}", path.display()))?,
    None => Draw::default(),
  };
  let demo = DetectionDemo::new(YolosBuilder::from_url(&args.model)?, draw);
  let output = SaveImageFileOutput::from_url(&args.output)?
    .with_draw(demo.draw().clone())
    .with_record(args.record);

  let registry = SessionRegistry::new();
  let session = registry.session(registry.open());

  let mut input = InputWrapper::from_url(&args.input)?;
  let bytes = input.read()?;
  if bytes.is_none() {
    warn!("没有读取到图像");
  }

  let detected = demo.detect(&mut session.lock(), bytes.as_deref(), args.threshold)?;
  if let Some((image, boxes)) = detected {
    output.render_result(&image, &boxes[..])?;
  }

  Ok(())
}
