// 该文件是 Chewei （车卫） 项目的一部分。
// src/output/mod.rs - 输出模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

mod annotator;
mod still;
mod video;

use anyhow::Result;
use image::RgbImage;

pub use annotator::Annotator;
pub use still::ImageWriter;
pub use video::VideoFileWriter;

use crate::input::has_extension;

/// 图片输出的扩展名
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// 输出写入器 trait
///
/// 接收已绘制完检测框的帧，按输入顺序逐帧追加写入。
pub trait OutputWriter {
  /// 写入一帧
  fn write_frame(&mut self, image: &RgbImage) -> Result<()>;

  /// 完成写入并落盘
  fn finish(&mut self) -> Result<()>;
}

/// 根据输出路径创建写入器
pub fn create_output_writer(
  output_path: &str,
  width: u32,
  height: u32,
  fps: Option<f64>,
) -> Result<Box<dyn OutputWriter>> {
  if has_extension(output_path, &IMAGE_EXTENSIONS) {
    Ok(Box::new(ImageWriter::new(output_path)))
  } else {
    Ok(Box::new(VideoFileWriter::new(
      output_path,
      width,
      height,
      fps.unwrap_or(30.0),
    )?))
  }
}
