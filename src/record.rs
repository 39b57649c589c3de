// 该文件是 Chewei （车卫） 项目的一部分。
// src/record.rs - 检测结果记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detector::Detection;

/// 单帧检测记录，序列化为一行 JSON
#[derive(Serialize)]
struct FrameRecord<'a> {
  /// 帧索引
  frame_index: u64,
  /// 帧时间戳（毫秒）
  timestamp_ms: u64,
  /// 写入记录时的墙钟时间
  recorded_at: DateTime<Utc>,
  /// 该帧的全部检测框
  detections: &'a [Detection],
}

/// 检测记录写入器（JSON Lines）
pub struct RecordWriter {
  writer: BufWriter<File>,
}

impl RecordWriter {
  /// 创建记录文件
  pub fn create(path: &str) -> Result<Self> {
    let file = File::create(path).with_context(|| format!("无法创建记录文件: {}", path))?;
    Ok(Self {
      writer: BufWriter::new(file),
    })
  }

  /// 追加一帧的检测记录
  pub fn record(
    &mut self,
    frame_index: u64,
    timestamp_ms: u64,
    detections: &[Detection],
  ) -> Result<()> {
    let record = FrameRecord {
      frame_index,
      timestamp_ms,
      recorded_at: Utc::now(),
      detections,
    };

    serde_json::to_writer(&mut self.writer, &record).context("无法序列化检测记录")?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }

  /// 冲刷缓冲
  pub fn finish(&mut self) -> Result<()> {
    self.writer.flush().context("无法写入记录文件")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_is_one_json_line_per_frame() {
    let dir = std::env::temp_dir().join("chewei-record-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("detections.jsonl");
    let path = path.to_str().unwrap();

    let detections = vec![Detection {
      x1: 1.0,
      y1: 2.0,
      x2: 3.0,
      y2: 4.0,
      confidence: 0.5,
    }];

    let mut writer = RecordWriter::create(path).unwrap();
    writer.record(0, 0, &detections).unwrap();
    writer.record(1, 33, &[]).unwrap();
    writer.finish().unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["frame_index"], 0);
    assert_eq!(first["detections"].as_array().unwrap().len(), 1);

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["frame_index"], 1);
    assert!(second["detections"].as_array().unwrap().is_empty());
  }
}
