// 该文件是 Yanshi （演示） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头拍照输入
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
use tracing::{debug, error, info};
use url::Url;
use v4l::{
  Device, FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  video::Capture,
};

use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_DEVICE: &str = "/dev/video0";
// 刚打开的摄像头前几帧通常曝光不足
const WARMUP_FRAMES: usize = 5;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Empty frame captured")]
  EmptyFrame,
}

/// 从摄像头拍一张 MJPEG 照片，产出 JPEG 字节
pub struct CameraInput {
  device_path: String,
}

impl FromUrlWithScheme for CameraInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for CameraInput {
  type Error = CameraInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CameraInputError::SchemaMismatch);
    }

    // v4l:///dev/video0
    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    Ok(CameraInput { device_path })
  }
}

impl CameraInput {
  /// 每次调用都重新打开设备拍一张
  pub fn capture(&mut self) -> Result<Vec<u8>, CameraInputError> {
    let mut device = Device::with_path(&self.device_path).inspect_err(|e| {
      error!("无法打开摄像头 {}: {}", self.device_path, e);
    })?;

    let mut format = device.format()?;
    format.fourcc = FourCC::new(b"MJPG");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"MJPG") {
      return Err(CameraInputError::UnsupportedPixelFormat(
        format.fourcc.to_string(),
      ));
    }
    info!(
      "摄像头 {} 格式: {}x{} {}",
      self.device_path, format.width, format.height, format.fourcc
    );

    let mut stream = Stream::with_buffers(&mut device, Type::VideoCapture, STREAM_BUFFERS)?;
    for _ in 0..WARMUP_FRAMES {
      stream.next()?;
    }

    let (buf, meta) = stream.next()?;
    let used = (meta.bytesused as usize).min(buf.len());
    if used == 0 {
      return Err(CameraInputError::EmptyFrame);
    }
    debug!("拍摄一帧: {} 字节", used);

    Ok(buf[..used].to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_device_is_video0() {
    let input = CameraInput::from_url(&Url::parse("v4l:///").unwrap()).unwrap();
    assert_eq!(input.device_path, DEFAULT_DEVICE);
  }

  #[test]
  fn missing_device_is_an_error() {
    let url = Url::parse("v4l:///dev/yanshi-no-such-camera").unwrap();
    let mut input = CameraInput::from_url(&url).unwrap();
    assert!(matches!(input.capture(), Err(CameraInputError::IoError(_))));
  }
}
