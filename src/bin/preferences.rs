// 该文件是 Yanshi （演示） 项目的一部分。
// src/bin/preferences.rs - 偏好选择演示
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
use tracing::debug;

use yanshi::demo::{Color, PreferenceDemo};

/// 选择颜色与数字，回显所选内容
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 颜色
  #[arg(long, value_enum, default_value_t = Color::Rojo)]
  pub color: Color,
  /// 1 到 10 之间的数字
  #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=10))]
  pub number: u8,
  /// 按下按钮
  #[arg(long)]
  pub click: bool,
}

fn main() -> Result<()> {
  yanshi::init_tracing();

  let args = Args::parse();
  debug!("参数: {:?}", args);

  let demo = PreferenceDemo::new(args.color, args.number, args.click);
  println!("{}", PreferenceDemo::TITLE);
  for line in demo.render() {
    println!("{}", line);
  }

  Ok(())
}
