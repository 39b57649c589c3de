// 该文件是 Chewei （车卫） 项目的一部分。
// src/output/video.rs - 视频文件输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{Pixel, output};
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{Rational, codec};
use image::RgbImage;
use tracing::debug;

use super::OutputWriter;

/// 帧率换算用的时间基分母，保留 29.97 这类非整数帧率
const TIME_BASE_SCALE: i32 = 1000;

/// 视频文件输出
///
/// 输入一帧写一帧，PTS 按帧索引递增，与输入帧一一对应，
/// 因此输出视频的帧数、分辨率、帧率与输入一致。
pub struct VideoFileWriter {
  /// FFmpeg 输出上下文
  output_context: ffmpeg::format::context::Output,
  /// 视频编码器
  encoder: ffmpeg::encoder::Video,
  /// RGB24 -> YUV420P 转换上下文
  scaler: ScalingContext,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 编码器时间基
  encoder_time_base: Rational,
  /// 流时间基
  stream_time_base: Rational,
  /// 视频流索引
  stream_index: usize,
  /// 帧索引，同时作为 PTS
  frame_index: u64,
}

impl VideoFileWriter {
  /// 创建视频输出文件
  pub fn new(output_path: &str, width: u32, height: u32, fps: f64) -> Result<Self> {
    ffmpeg::init().context("无法初始化 FFmpeg")?;

    let mut output_context =
      output(&output_path).with_context(|| format!("无法创建输出文件: {}", output_path))?;

    let codec = ffmpeg::encoder::find(codec::Id::H264)
      .or_else(|| ffmpeg::encoder::find(codec::Id::MPEG4))
      .context("找不到可用的视频编码器")?;

    debug!("视频编码器: {}", codec.name());

    let mut stream = output_context.add_stream(codec)?;
    let stream_index = stream.index();

    // 帧率按 1/1000 时间基表达，避免 29.97 之类的帧率被取整
    let frame_rate = Rational::new((fps * TIME_BASE_SCALE as f64).round() as i32, TIME_BASE_SCALE);
    let encoder_time_base = frame_rate.invert();

    let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
      .encoder()
      .video()?;
    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_frame_rate(Some(frame_rate));
    encoder.set_time_base(encoder_time_base);

    let encoder = encoder.open().context("无法打开视频编码器")?;
    stream.set_parameters(&encoder);

    output_context
      .write_header()
      .context("无法写入视频文件头")?;

    // 流时间基在写文件头时才由封装器定下来
    let stream_time_base = output_context
      .stream(stream_index)
      .map(|stream| stream.time_base())
      .unwrap_or(encoder_time_base);

    let scaler = ScalingContext::get(
      Pixel::RGB24,
      width,
      height,
      Pixel::YUV420P,
      width,
      height,
      Flags::BILINEAR,
    )
    .context("无法创建像素格式转换上下文")?;

    Ok(Self {
      output_context,
      encoder,
      scaler,
      width,
      height,
      encoder_time_base,
      stream_time_base,
      stream_index,
      frame_index: 0,
    })
  }

  /// 送入一帧（None 表示冲刷）并把产出的包写入文件
  fn encode(&mut self, frame: Option<&Video>) -> Result<()> {
    match frame {
      Some(frame) => self.encoder.send_frame(frame)?,
      None => self.encoder.send_eof()?,
    }

    let mut packet = ffmpeg::Packet::empty();
    while self.encoder.receive_packet(&mut packet).is_ok() {
      packet.set_stream(self.stream_index);
      packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
      packet.write_interleaved(&mut self.output_context)?;
    }

    Ok(())
  }

  /// 把紧凑的 RGB 缓冲拷贝进带步长对齐的 FFmpeg 帧
  fn fill_rgb_frame(&self, image: &RgbImage) -> Video {
    let mut rgb_frame = Video::new(Pixel::RGB24, self.width, self.height);
    let stride = rgb_frame.stride(0);
    let row_bytes = self.width as usize * 3;
    let data = image.as_raw();

    let frame_data = rgb_frame.data_mut(0);
    for y in 0..self.height as usize {
      let src = y * row_bytes;
      let dst = y * stride;
      frame_data[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
    }

    rgb_frame
  }
}

impl OutputWriter for VideoFileWriter {
  fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
    anyhow::ensure!(
      image.width() == self.width && image.height() == self.height,
      "帧尺寸与输出不符: {}x{}, 期望 {}x{}",
      image.width(),
      image.height(),
      self.width,
      self.height
    );

    let rgb_frame = self.fill_rgb_frame(image);

    let mut yuv_frame = Video::empty();
    self
      .scaler
      .run(&rgb_frame, &mut yuv_frame)
      .context("像素格式转换失败")?;

    yuv_frame.set_pts(Some(self.frame_index as i64));
    self.frame_index += 1;

    self.encode(Some(&yuv_frame))
  }

  fn finish(&mut self) -> Result<()> {
    self.encode(None)?;
    self
      .output_context
      .write_trailer()
      .context("无法写入视频文件尾")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::{InputSource, VideoFileSource};

  const WIDTH: u32 = 64;
  const HEIGHT: u32 = 48;
  const FRAME_COUNT: u64 = 8;

  fn test_output_path(name: &str) -> String {
    let dir = std::env::temp_dir().join("chewei-video-writer-test");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name).to_str().unwrap().to_string()
  }

  fn flat_frame(shade: u8) -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, image::Rgb([shade, 128, 255 - shade]))
  }

  #[test]
  fn one_encoded_frame_per_write_and_clean_readback() {
    let path = test_output_path("roundtrip.avi");

    let mut writer = VideoFileWriter::new(&path, WIDTH, HEIGHT, 25.0).unwrap();
    for i in 0..FRAME_COUNT {
      writer.write_frame(&flat_frame((i * 24) as u8)).unwrap();
    }

    // PTS 即帧索引，写入 F 帧后恰好推进到 F
    assert_eq!(writer.frame_index, FRAME_COUNT);
    writer.finish().unwrap();

    // 读回: 帧数与分辨率同输入一一对应，流结束处干净收尾而不是报错
    let mut source = VideoFileSource::open(&path).unwrap();
    assert_eq!(source.width(), WIDTH);
    assert_eq!(source.height(), HEIGHT);

    let mut frames = 0u64;
    for frame in source.by_ref() {
      let frame = frame.unwrap();
      assert_eq!(frame.image.width(), WIDTH);
      assert_eq!(frame.image.height(), HEIGHT);
      assert_eq!(frame.index, frames);
      frames += 1;
    }
    assert_eq!(frames, FRAME_COUNT);

    // 流耗尽后继续取帧保持 None
    assert!(source.next().is_none());
  }

  #[test]
  fn mismatched_frame_size_is_rejected() {
    let path = test_output_path("mismatch.avi");

    let mut writer = VideoFileWriter::new(&path, WIDTH, HEIGHT, 25.0).unwrap();
    let wrong = RgbImage::from_pixel(WIDTH * 2, HEIGHT, image::Rgb([0, 0, 0]));

    assert!(writer.write_frame(&wrong).is_err());
  }
}
