// 该文件是 Chewei （车卫） 项目的一部分。
// src/input/mod.rs - 输入源模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

mod camera;
mod still;
mod video;

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

pub use camera::CameraSource;
pub use still::StillSource;
pub use video::VideoFileSource;

/// 单张图片的扩展名
const STILL_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 帧数据
pub struct Frame {
  /// RGB 图像数据，检测框直接绘制在其上
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 输入模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
  /// 实时摄像头
  Camera,
  /// 视频文件
  VideoFile,
  /// 单张图片
  Still,
}

impl SourceKind {
  pub fn describe(&self) -> &'static str {
    match self {
      SourceKind::Camera => "实时摄像头",
      SourceKind::VideoFile => "视频文件",
      SourceKind::Still => "单张图片",
    }
  }
}

/// 输入源 trait
///
/// 逐帧产出，一帧处理完才取下一帧，没有内部缓冲。
pub trait InputSource: Iterator<Item = Result<Frame>> {
  /// 输入模式
  fn kind(&self) -> SourceKind;

  /// 帧宽度
  fn width(&self) -> u32;

  /// 帧高度
  fn height(&self) -> u32;

  /// 帧率（摄像头与视频文件有效）
  fn fps(&self) -> Option<f64>;
}

/// 根据输入路径选择模式并打开输入源
///
/// - `/dev/videoN` 或 `v4l2://` 前缀: 实时摄像头
/// - 图片扩展名: 单张图片
/// - 其余: 视频文件
pub fn open_source(source: &str) -> Result<Box<dyn InputSource>> {
  if let Some(device) = camera_device_path(source) {
    return Ok(Box::new(CameraSource::open(device)?));
  }

  if has_extension(source, &STILL_EXTENSIONS) {
    return Ok(Box::new(StillSource::open(source)?));
  }

  Ok(Box::new(VideoFileSource::open(source)?))
}

/// 判断输入是否为 V4L2 摄像头，是则返回设备路径
fn camera_device_path(source: &str) -> Option<&str> {
  if let Some(path) = source.strip_prefix("v4l2://") {
    return Some(path);
  }
  if source.starts_with("/dev/video") {
    return Some(source);
  }
  None
}

/// 判断路径扩展名是否在给定列表中（忽略大小写）
pub(crate) fn has_extension(path: &str, extensions: &[&str]) -> bool {
  Path::new(path)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_ascii_lowercase();
      extensions.iter().any(|known| *known == ext)
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_paths_are_recognized() {
    assert_eq!(camera_device_path("/dev/video0"), Some("/dev/video0"));
    assert_eq!(camera_device_path("v4l2:///dev/video2"), Some("/dev/video2"));
    assert_eq!(camera_device_path("clip.mp4"), None);
  }

  #[test]
  fn extension_match_ignores_case() {
    assert!(has_extension("photo.JPG", &STILL_EXTENSIONS));
    assert!(has_extension("photo.png", &STILL_EXTENSIONS));
    assert!(!has_extension("clip.mp4", &STILL_EXTENSIONS));
    assert!(!has_extension("noext", &STILL_EXTENSIONS));
  }
}
