// 该文件是 Chewei （车卫） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

mod args;
mod detector;
mod input;
mod output;
mod record;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use detector::DamageDetector;
use input::{SourceKind, open_source};
use output::{Annotator, create_output_writer};
use record::RecordWriter;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("Chewei 车损检测");
  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出文件: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  // 先加载模型，失败则在请求任何帧之前退出
  info!("正在加载模型...");
  let mut detector = DamageDetector::new(&args.model, args.confidence)?;

  info!("正在打开输入源...");
  let mut input_source = open_source(&args.input)?;
  info!(
    "输入源已打开: {}x{} {}",
    input_source.width(),
    input_source.height(),
    input_source.kind().describe()
  );

  info!("正在创建输出...");
  let mut output_writer = create_output_writer(
    &args.output,
    input_source.width(),
    input_source.height(),
    input_source.fps(),
  )?;

  let mut record_writer = match &args.record {
    Some(path) => Some(RecordWriter::create(path)?),
    None => None,
  };

  let annotator = Annotator::new();

  // 实时模式下 Ctrl-C 置位后在帧间退出循环
  let (interrupt_tx, interrupt_rx) = std::sync::mpsc::channel();
  if input_source.kind() == SourceKind::Camera {
    ctrlc::set_handler(move || {
      let _ = interrupt_tx.send(());
    })
    .expect("无法注册 Ctrl-C 处理器");
  }

  info!("开始处理...");
  let mut frame_count = 0u64;
  let mut total_detections = 0usize;

  while let Some(frame_result) = input_source.next() {
    let mut frame = frame_result?;

    if args.max_frames > 0 && frame_count >= args.max_frames {
      warn!("已达到最大帧数限制: {}", args.max_frames);
      break;
    }

    if interrupt_rx.try_recv().is_ok() {
      warn!("收到中断信号，停止请求新帧");
      break;
    }

    // 逐帧顺序处理: 检测 -> 绘制 -> 写出，处理完才取下一帧
    let detections = detector.detect(&frame.image)?;
    total_detections += detections.len();

    if !detections.is_empty() {
      info!(
        "帧 {} (时间: {}ms): 检测到 {} 处损伤",
        frame.index,
        frame.timestamp_ms,
        detections.len()
      );
      for det in &detections {
        info!(
          "  - {} at ({:.0}, {:.0})-({:.0}, {:.0})",
          det.label(),
          det.x1,
          det.y1,
          det.x2,
          det.y2
        );
      }
    }

    annotator.annotate(&mut frame.image, &detections);
    output_writer.write_frame(&frame.image)?;

    if let Some(writer) = record_writer.as_mut() {
      writer.record(frame.index, frame.timestamp_ms, &detections)?;
    }

    frame_count += 1;
  }

  output_writer.finish()?;
  if let Some(writer) = record_writer.as_mut() {
    writer.finish()?;
  }

  info!("处理完成!");
  info!("总帧数: {}", frame_count);
  info!("总检测数: {}", total_detections);
  info!("输出文件: {}", args.output);

  Ok(())
}
