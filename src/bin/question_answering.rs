// 该文件是 Yanshi （演示） 项目的一部分。
// src/bin/question_answering.rs - 问答演示
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use yanshi::{FromUrl, demo::QaDemo, model::QaPipelineBuilder, session::SessionRegistry};

/// 根据上下文回答问题
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，`hf://owner/name` 或 `file:///path/to/dir`
  #[arg(long, value_name = "MODEL", default_value = "hf://deepset/roberta-base-squad2")]
  pub model: Url,
  /// 上下文
  #[arg(long, default_value = "")]
  pub context: String,
  /// 问题
  #[arg(long, default_value = "")]
  pub question: String,
}

fn main() -> Result<()> {
  yanshi::init_tracing();

  let args = Args::parse();
  info!("模型来源: {}", args.model);

  let builder = QaPipelineBuilder::from_url(&args.model)?;
  let demo = QaDemo::new(builder);

  let registry = SessionRegistry::new();
  let session = registry.session(registry.open());

  if let Some(message) = demo.run(&mut session.lock(), true, &args.question, &args.context)? {
    println!("{}", message);
  }

  Ok(())
}
