// 该文件是 Chewei （车卫） 项目的一部分。
// src/output/annotator.rs - 检测框绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detector::Detection;

/// 边框与标签颜色（红色）
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// 边框线宽（像素）
const BOX_THICKNESS: i32 = 3;
/// 标签字号
const LABEL_FONT_SIZE: f32 = 20.0;
/// 标签相对边框上沿的偏移（像素）
const LABEL_OFFSET: i32 = 24;

/// 检测框绘制工具
///
/// 在帧上原地绘制，不另行分配帧缓冲。每个高于阈值的检测
/// 独立绘制一次，重叠的框互不影响。
pub struct Annotator {
  /// 标签字体
  font: FontArc,
  /// 字号
  font_scale: PxScale,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new()
  }
}

impl Annotator {
  pub fn new() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载内嵌字体");

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  /// 在帧上绘制所有检测框与标签
  ///
  /// 检测框坐标保持解码时的原样，可以落在帧外；
  /// 绘制阶段由底层按图像边界裁剪。
  pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_box(image, detection);
      self.draw_label(image, detection);
    }
  }

  /// 绘制加粗的空心矩形边框
  fn draw_box(&self, image: &mut RgbImage, detection: &Detection) {
    let x = detection.x1.floor() as i32;
    let y = detection.y1.floor() as i32;
    let width = (detection.x2 - detection.x1).ceil() as i32;
    let height = (detection.y2 - detection.y1).ceil() as i32;

    for inset in 0..BOX_THICKNESS {
      let w = width - 2 * inset;
      let h = height - 2 * inset;
      if w < 1 || h < 1 {
        break;
      }
      let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
  }

  /// 在边框左上角上方绘制置信度标签
  fn draw_label(&self, image: &mut RgbImage, detection: &Detection) {
    let label = detection.label();
    let x = detection.x1.floor() as i32;
    let y = detection.y1.floor() as i32 - LABEL_OFFSET;

    draw_text_mut(
      image,
      BOX_COLOR,
      x,
      y,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const GRAY: Rgb<u8> = Rgb([64, 64, 64]);

  fn gray_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, GRAY)
  }

  fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection {
      x1,
      y1,
      x2,
      y2,
      confidence: 0.9,
    }
  }

  #[test]
  fn no_detections_leaves_frame_untouched() {
    let annotator = Annotator::new();
    let mut image = gray_frame(64, 64);
    let original = image.clone();

    annotator.annotate(&mut image, &[]);

    assert_eq!(image.as_raw(), original.as_raw());
  }

  #[test]
  fn box_border_is_drawn_in_red() {
    let annotator = Annotator::new();
    let mut image = gray_frame(100, 100);

    annotator.annotate(&mut image, &[detection(10.0, 40.0, 50.0, 80.0)]);

    // 左边框被描红，矩形内部保持原色
    assert_eq!(*image.get_pixel(10, 60), BOX_COLOR);
    assert_eq!(*image.get_pixel(30, 60), GRAY);
  }

  #[test]
  fn overlapping_boxes_are_both_drawn() {
    let annotator = Annotator::new();
    let mut image = gray_frame(120, 120);

    // 两个高度重叠的框各自独立绘制
    annotator.annotate(
      &mut image,
      &[
        detection(30.0, 40.0, 70.0, 100.0),
        detection(35.0, 40.0, 75.0, 100.0),
      ],
    );

    assert_eq!(*image.get_pixel(30, 60), BOX_COLOR);
    assert_eq!(*image.get_pixel(74, 60), BOX_COLOR);
  }

  #[test]
  fn out_of_frame_box_is_clipped_when_drawn() {
    let annotator = Annotator::new();
    let mut image = gray_frame(64, 64);

    // 绘制不会越界崩溃，帧内可见部分仍被描红
    annotator.annotate(&mut image, &[detection(-20.0, -20.0, 32.0, 32.0)]);

    assert_eq!(*image.get_pixel(10, 31), BOX_COLOR);
  }
}
