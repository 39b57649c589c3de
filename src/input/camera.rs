// 该文件是 Chewei （车卫） 项目的一部分。
// src/input/camera.rs - V4L2 摄像头输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use std::pin::Pin;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{Frame, InputSource, SourceKind};

/// 摄像头采集的默认分辨率
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
/// mmap 缓冲区个数
const CAPTURE_BUFFERS: u32 = 4;

/// V4L2 摄像头输入源
///
/// v4l 的 Stream 借用 Device，而两者要放进同一个结构体。
/// Device 用 Pin<Box> 固定在堆上，Stream 的引用通过 transmute
/// 延长为 'static；Drop 时先收回 Stream 再释放 Device。
pub struct CameraSource {
  /// V4L2 设备，固定内存位置
  device: Pin<Box<Device>>,
  /// 捕获流，生命周期由 Drop 顺序保证
  stream: Option<Stream<'static>>,
  /// 帧索引
  frame_index: u64,
  /// 帧宽度
  width: u32,
  /// 帧高度
  height: u32,
  /// 驱动报告的帧率
  fps: Option<f64>,
  /// 采集起始时间，用于帧时间戳
  start_time: Instant,
}

impl CameraSource {
  /// 打开摄像头设备
  pub fn open(device_path: &str) -> Result<Self> {
    let device = Box::pin(
      Device::with_path(device_path)
        .with_context(|| format!("无法打开摄像头设备: {}", device_path))?,
    );

    let mut format = device.format().context("无法读取摄像头格式")?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).context("无法设置摄像头格式")?;

    if &format.fourcc.repr != b"YUYV" {
      anyhow::bail!("摄像头不支持 YUYV 采集格式: {}", format.fourcc);
    }

    debug!("摄像头采集格式: {}x{} YUYV", format.width, format.height);

    let fps = match device.params() {
      Ok(params) => {
        let interval = params.interval;
        if interval.numerator > 0 {
          Some(interval.denominator as f64 / interval.numerator as f64)
        } else {
          None
        }
      }
      Err(e) => {
        warn!("无法查询摄像头帧率: {}", e);
        None
      }
    };

    let mut source = Self {
      device,
      stream: None,
      frame_index: 0,
      width: format.width,
      height: format.height,
      fps,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上不会移动，stream 与 device
    // 存在同一结构体中，Drop 先 take 掉 stream 再释放 device，
    // 因此把借用延长到 'static 不会产生悬垂引用。
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)
        .context("无法创建摄像头捕获流")?
    };

    source.stream = Some(stream);
    Ok(source)
  }
}

impl Drop for CameraSource {
  fn drop(&mut self) {
    // stream 必须先于 device 释放
    self.stream.take();
  }
}

impl Iterator for CameraSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb = yuyv_to_rgb(buffer, self.width, self.height);

        let image = match RgbImage::from_raw(self.width, self.height, rgb) {
          Some(image) => image,
          None => return Some(Err(anyhow::anyhow!("摄像头帧数据长度不足"))),
        };

        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms: self.start_time.elapsed().as_millis() as u64,
        };

        self.frame_index += 1;
        Some(Ok(frame))
      }
      Err(e) => Some(Err(anyhow::anyhow!("摄像头采集失败: {}", e))),
    }
  }
}

impl InputSource for CameraSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Camera
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }
}

/// YUYV 转 RGB
///
/// 每 4 字节携带两个像素（Y0 U Y1 V），色度分量由相邻像素共享。
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;

    for &y in &[chunk[0], chunk[2]] {
      let y = y as f32;
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    // 无色度偏移时，Y 分量直接成为灰度值
    let yuyv = [128u8, 128, 128, 128];
    let rgb = yuyv_to_rgb(&yuyv, 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
  }

  #[test]
  fn yuyv_output_length_matches_pixels() {
    let yuyv = vec![0u8; (4 * 2) as usize];
    let rgb = yuyv_to_rgb(&yuyv, 4, 1);
    assert_eq!(rgb.len(), 4 * 3);
  }
}
