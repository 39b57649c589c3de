// 该文件是 Chewei （车卫） 项目的一部分。
// src/output/still.rs - 图片输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use anyhow::{Context, Result};
use image::RgbImage;

use super::OutputWriter;

/// 图片输出，保存最后写入的一帧
pub struct ImageWriter {
  output_path: String,
}

impl ImageWriter {
  pub fn new(output_path: &str) -> Self {
    Self {
      output_path: output_path.to_string(),
    }
  }
}

impl OutputWriter for ImageWriter {
  fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
    image
      .save(&self.output_path)
      .with_context(|| format!("无法保存图片: {}", self.output_path))?;
    Ok(())
  }

  fn finish(&mut self) -> Result<()> {
    Ok(())
  }
}
