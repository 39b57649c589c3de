// 该文件是 Chewei （车卫） 项目的一部分。
// src/detector/damage.rs - 车损检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Chewei 项目作者

use image::RgbImage;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// 模型输入宽度
pub const MODEL_INPUT_WIDTH: u32 = 640;
/// 模型输入高度
pub const MODEL_INPUT_HEIGHT: u32 = 640;
/// 每次推理产生的候选框数量
pub const NUM_CANDIDATES: usize = 8400;
/// 输出张量的通道数: cx, cy, w, h, score
pub const NUM_FIELDS: usize = 5;

/// 检测器错误
#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型加载失败: {path}: {source}")]
  ModelLoad {
    path: String,
    #[source]
    source: ort::Error,
  },
  #[error("输入帧无效: {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
  #[error("推理失败: {0}")]
  Inference(#[from] ort::Error),
  #[error("模型缺少输出张量")]
  MissingOutput,
  #[error("输出张量形状不符: 期望 [1, 5, 8400], 实际 {actual}")]
  OutputShape { actual: String },
}

/// 检测结果
///
/// 边界框为原始帧像素坐标系下的角点矩形。解码时不做裁剪，
/// 当模型预测的中心与尺寸落在帧外时，坐标可以为负或超出帧边界。
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
  /// 左上角 x 坐标
  pub x1: f32,
  /// 左上角 y 坐标
  pub y1: f32,
  /// 右下角 x 坐标
  pub x2: f32,
  /// 右下角 y 坐标
  pub y2: f32,
  /// 置信度
  pub confidence: f32,
}

impl Detection {
  /// 标签文本，置信度取四舍五入后的百分数
  pub fn label(&self) -> String {
    format!("DENT {}%", (self.confidence * 100.0).round() as u32)
  }
}

/// 输出张量中一个候选槽位的命名视图
///
/// 输出张量按 [1, 5, 8400] 排布，即 5 条长度为 8400 的平行序列。
/// 直接用 output[4][i] 这类下标取值容易写错通道，
/// 因此解码前先把一个槽位的五个分量收进该结构。
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
  /// 归一化中心 x
  pub center_x: f32,
  /// 归一化中心 y
  pub center_y: f32,
  /// 归一化宽度
  pub width: f32,
  /// 归一化高度
  pub height: f32,
  /// 置信度
  pub confidence: f32,
}

impl Candidate {
  /// 从平面排布的输出数据中读取第 index 个槽位
  fn from_planes(planes: &[f32], index: usize) -> Self {
    Self {
      center_x: planes[index],
      center_y: planes[NUM_CANDIDATES + index],
      width: planes[2 * NUM_CANDIDATES + index],
      height: planes[3 * NUM_CANDIDATES + index],
      confidence: planes[4 * NUM_CANDIDATES + index],
    }
  }

  /// 中心-尺寸矩形转为原始帧像素坐标下的角点矩形
  fn to_detection(self, frame_width: f32, frame_height: f32) -> Detection {
    Detection {
      x1: (self.center_x - self.width / 2.0) * frame_width,
      y1: (self.center_y - self.height / 2.0) * frame_height,
      x2: (self.center_x + self.width / 2.0) * frame_width,
      y2: (self.center_y + self.height / 2.0) * frame_height,
      confidence: self.confidence,
    }
  }
}

/// 车损检测器
///
/// 持有加载好的 ONNX 推理会话。进程启动时构造一次，
/// 之后按帧顺序复用；ort 的内部缓冲区不保证可重入，
/// 因此 detect 要求 &mut self。
pub struct DamageDetector {
  /// ONNX Runtime 会话
  session: Session,
  /// 置信度阈值（严格大于才保留）
  confidence_threshold: f32,
}

impl DamageDetector {
  /// 加载模型并创建检测器
  pub fn new(model_path: &str, confidence_threshold: f32) -> Result<Self, DetectorError> {
    info!("加载模型文件: {}", model_path);

    let session = Session::builder()
      .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
      .and_then(|builder| builder.with_intra_threads(4))
      .and_then(|builder| builder.commit_from_file(model_path))
      .map_err(|source| DetectorError::ModelLoad {
        path: model_path.to_string(),
        source,
      })?;

    info!("模型加载完成");

    Ok(Self {
      session,
      confidence_threshold,
    })
  }

  /// 预处理图像
  ///
  /// 缩放到 640x640（三角滤波，与模型训练时的双线性约定一致），
  /// 像素值从 [0,255] 归一化到 [0.0,1.0]，NHWC 排布并加上 batch 维。
  fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(
      image,
      MODEL_INPUT_WIDTH,
      MODEL_INPUT_HEIGHT,
      image::imageops::FilterType::Triangle,
    );

    let mut input = Array4::<f32>::zeros((
      1,
      MODEL_INPUT_HEIGHT as usize,
      MODEL_INPUT_WIDTH as usize,
      3,
    ));

    for (x, y, pixel) in resized.enumerate_pixels() {
      input[[0, y as usize, x as usize, 0]] = pixel[0] as f32 / 255.0;
      input[[0, y as usize, x as usize, 1]] = pixel[1] as f32 / 255.0;
      input[[0, y as usize, x as usize, 2]] = pixel[2] as f32 / 255.0;
    }

    input
  }

  /// 对一帧图像运行推理
  ///
  /// 返回原始帧像素坐标下的检测框。同一帧内保留所有高于阈值的候选，
  /// 不做非极大值抑制，重叠的框各自独立保留。
  pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    let frame_width = image.width();
    let frame_height = image.height();

    if frame_width == 0 || frame_height == 0 {
      return Err(DetectorError::InvalidFrame {
        width: frame_width,
        height: frame_height,
      });
    }

    debug!("预处理输入帧: {}x{}", frame_width, frame_height);
    let input = self.preprocess(image);
    let input_value = Value::from_array(input)?;

    debug!("执行模型推理");
    let outputs = self.session.run(ort::inputs!["images" => input_value])?;

    let output = outputs
      .get("output0")
      .or_else(|| outputs.get("output"))
      .ok_or(DetectorError::MissingOutput)?;

    let (shape, data) = output.try_extract_tensor::<f32>()?;

    // 形状不符说明模型与约定不一致，属于契约违规，直接报错而不是
    // 悄悄跳过帧，否则会产出一段看似干净实则漏检的视频。
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    if dims != [1, NUM_FIELDS, NUM_CANDIDATES] {
      return Err(DetectorError::OutputShape {
        actual: format!("{:?}", dims),
      });
    }

    let detections = decode_planes(
      data,
      frame_width as f32,
      frame_height as f32,
      self.confidence_threshold,
    );

    debug!("检测到 {} 个损伤区域", detections.len());
    Ok(detections)
  }
}

/// 解码平面排布的输出张量
///
/// planes 为 [5, 8400] 的行主序数据。逐槽位读取置信度，
/// 严格大于阈值（score > threshold，不含等于）才保留，
/// 并把归一化的中心-尺寸矩形换算到原始帧像素坐标。
fn decode_planes(
  planes: &[f32],
  frame_width: f32,
  frame_height: f32,
  threshold: f32,
) -> Vec<Detection> {
  let mut detections = Vec::new();

  for index in 0..NUM_CANDIDATES {
    let candidate = Candidate::from_planes(planes, index);
    if candidate.confidence > threshold {
      detections.push(candidate.to_detection(frame_width, frame_height));
    }
  }

  detections
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 构造一个 [5, 8400] 的平面输出，把给定候选依次填入前几个槽位，
  /// 其余槽位置信度为 0
  fn planes_with(candidates: &[(f32, f32, f32, f32, f32)]) -> Vec<f32> {
    let mut planes = vec![0.0f32; NUM_FIELDS * NUM_CANDIDATES];
    for (index, &(cx, cy, w, h, score)) in candidates.iter().enumerate() {
      planes[index] = cx;
      planes[NUM_CANDIDATES + index] = cy;
      planes[2 * NUM_CANDIDATES + index] = w;
      planes[3 * NUM_CANDIDATES + index] = h;
      planes[4 * NUM_CANDIDATES + index] = score;
    }
    planes
  }

  #[test]
  fn no_detections_below_threshold() {
    let planes = planes_with(&[(0.5, 0.5, 0.2, 0.2, 0.44), (0.3, 0.3, 0.1, 0.1, 0.2)]);
    let detections = decode_planes(&planes, 640.0, 360.0, 0.45);
    assert!(detections.is_empty());
  }

  #[test]
  fn threshold_is_exclusive() {
    // 恰好等于阈值的候选不保留
    let planes = planes_with(&[(0.5, 0.5, 0.2, 0.2, 0.45)]);
    assert!(decode_planes(&planes, 640.0, 360.0, 0.45).is_empty());

    // 略高于阈值的候选恰好保留一个
    let planes = planes_with(&[(0.5, 0.5, 0.2, 0.2, 0.45 + 1e-4)]);
    assert_eq!(decode_planes(&planes, 640.0, 360.0, 0.45).len(), 1);
  }

  #[test]
  fn center_size_to_pixel_corners() {
    let planes = planes_with(&[(0.5, 0.5, 0.2, 0.4, 0.9)]);
    let detections = decode_planes(&planes, 640.0, 360.0, 0.45);
    assert_eq!(detections.len(), 1);

    let det = &detections[0];
    assert!((det.x1 - 256.0).abs() < 1e-3);
    assert!((det.y1 - 108.0).abs() < 1e-3);
    assert!((det.x2 - 384.0).abs() < 1e-3);
    assert!((det.y2 - 252.0).abs() < 1e-3);
  }

  #[test]
  fn corners_scale_with_frame_size() {
    let planes = planes_with(&[(0.4, 0.6, 0.2, 0.2, 0.9)]);
    let small = decode_planes(&planes, 640.0, 360.0, 0.45);
    let large = decode_planes(&planes, 1280.0, 720.0, 0.45);

    assert!((large[0].x1 - small[0].x1 * 2.0).abs() < 1e-3);
    assert!((large[0].y1 - small[0].y1 * 2.0).abs() < 1e-3);
    assert!((large[0].x2 - small[0].x2 * 2.0).abs() < 1e-3);
    assert!((large[0].y2 - small[0].y2 * 2.0).abs() < 1e-3);
  }

  #[test]
  fn overlapping_candidates_kept_without_nms() {
    // 两个高度重叠的高置信度候选，全部保留
    let planes = planes_with(&[(0.5, 0.5, 0.2, 0.2, 0.9), (0.51, 0.5, 0.2, 0.2, 0.8)]);
    let detections = decode_planes(&planes, 640.0, 360.0, 0.45);
    assert_eq!(detections.len(), 2);
  }

  #[test]
  fn out_of_frame_boxes_not_clamped() {
    // 中心靠边且尺寸较大，角点落在帧外
    let planes = planes_with(&[(0.05, 0.05, 0.3, 0.3, 0.9)]);
    let detections = decode_planes(&planes, 640.0, 360.0, 0.45);
    assert_eq!(detections.len(), 1);
    assert!(detections[0].x1 < 0.0);
    assert!(detections[0].y1 < 0.0);
  }

  #[test]
  fn label_rounds_percentage() {
    let det = Detection {
      x1: 0.0,
      y1: 0.0,
      x2: 10.0,
      y2: 10.0,
      confidence: 0.456,
    };
    assert_eq!(det.label(), "DENT 46%");
  }
}
