// 该文件是 Chewei （车卫） 项目的一部分。
// src/input/video.rs - 视频文件输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{Pixel, input};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;
use tracing::debug;

use super::{Frame, InputSource, SourceKind};

/// 视频文件输入源
///
/// 解封装、解码后统一缩放为 RGB24，逐帧产出。
/// 打不开或没有视频流的文件在构造时就报错，不会产出半截输出。
pub struct VideoFileSource {
  /// FFmpeg 输入上下文
  input_context: ffmpeg::format::context::Input,
  /// 视频流索引
  stream_index: usize,
  /// 视频解码器
  decoder: ffmpeg::decoder::Video,
  /// 像素格式转换上下文
  scaler: ScalingContext,
  /// 帧索引
  frame_index: u64,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 平均帧率
  fps: f64,
  /// 流时间基，用于把 PTS 换算成毫秒
  time_base: f64,
  /// 是否已向解码器送入 EOF（只允许送一次）
  eof_sent: bool,
  /// 解码是否已结束
  finished: bool,
}

impl VideoFileSource {
  /// 打开视频文件
  pub fn open(path: &str) -> Result<Self> {
    ffmpeg::init().context("无法初始化 FFmpeg")?;

    let input_context = input(&path).with_context(|| format!("无法打开视频文件: {}", path))?;

    let stream = input_context
      .streams()
      .best(Type::Video)
      .with_context(|| format!("文件中没有视频流: {}", path))?;
    let stream_index = stream.index();

    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
      .context("无法创建解码器上下文")?
      .decoder()
      .video()
      .context("无法打开视频解码器")?;

    let width = decoder.width();
    let height = decoder.height();
    if width == 0 || height == 0 {
      anyhow::bail!("视频尺寸无效: {}x{}", width, height);
    }

    let rate = stream.avg_frame_rate();
    let fps = if rate.denominator() != 0 {
      rate.numerator() as f64 / rate.denominator() as f64
    } else {
      0.0
    };

    let tb = stream.time_base();
    let time_base = if tb.denominator() != 0 {
      tb.numerator() as f64 / tb.denominator() as f64
    } else {
      0.0
    };

    debug!("视频流: {}x{} @ {:.3} fps", width, height, fps);

    let scaler = ScalingContext::get(
      decoder.format(),
      width,
      height,
      Pixel::RGB24,
      width,
      height,
      Flags::BILINEAR,
    )
    .context("无法创建像素格式转换上下文")?;

    Ok(Self {
      input_context,
      stream_index,
      decoder,
      scaler,
      frame_index: 0,
      width,
      height,
      fps,
      time_base,
      eof_sent: false,
      finished: false,
    })
  }

  /// 解码下一帧，文件读尽后冲刷解码器
  ///
  /// EOF 只向解码器送一次，之后仅排空其缓冲的帧；
  /// 对有输出延迟的解码器（如带 B 帧的 H.264）重复送 EOF
  /// 会返回错误，把正常的流结束变成解码失败。
  fn decode_next(&mut self) -> Result<Option<Video>> {
    let mut decoded = Video::empty();

    loop {
      if self.decoder.receive_frame(&mut decoded).is_ok() {
        return Ok(Some(decoded));
      }

      if self.eof_sent {
        return Ok(None);
      }

      let packet = self
        .input_context
        .packets()
        .find(|(stream, _)| stream.index() == self.stream_index);

      match packet {
        Some((_, packet)) => {
          self.decoder.send_packet(&packet).context("解码失败")?;
        }
        None => {
          self.decoder.send_eof().context("解码器冲刷失败")?;
          self.eof_sent = true;
        }
      }
    }
  }

  /// 把缩放后的 RGB24 帧拷贝成紧凑的图像缓冲
  ///
  /// FFmpeg 的行步长带对齐填充，需要逐行取有效部分。
  fn to_image(&self, rgb_frame: &Video) -> Result<RgbImage> {
    let data = rgb_frame.data(0);
    let stride = rgb_frame.stride(0);
    let row_bytes = self.width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
    for y in 0..self.height as usize {
      let start = y * stride;
      pixels.extend_from_slice(&data[start..start + row_bytes]);
    }

    RgbImage::from_raw(self.width, self.height, pixels)
      .context("解码帧数据长度与尺寸不符")
  }
}

impl Iterator for VideoFileSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let decoded = match self.decode_next() {
      Ok(Some(decoded)) => decoded,
      Ok(None) => {
        self.finished = true;
        return None;
      }
      Err(e) => {
        self.finished = true;
        return Some(Err(e));
      }
    };

    let mut rgb_frame = Video::empty();
    if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
      return Some(Err(anyhow::anyhow!("像素格式转换失败: {}", e)));
    }

    let image = match self.to_image(&rgb_frame) {
      Ok(image) => image,
      Err(e) => return Some(Err(e)),
    };

    let timestamp_ms = decoded
      .timestamp()
      .map_or(0, |ts| (ts as f64 * self.time_base * 1000.0) as u64);

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms,
    };

    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for VideoFileSource {
  fn kind(&self) -> SourceKind {
    SourceKind::VideoFile
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps)
  }
}
