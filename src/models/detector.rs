use crate::config::OnnxConfig;
use crate::image::ImageTransforms;
use crate::models::session::load_session;
use crate::models::traits::{Detection, Detector};
use crate::utils::error::CaneError;
use crate::Result;
use image::imageops;
use image::{Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD, Ix3};
use ort::{inputs, session::Session, value::Tensor};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// letterbox 填充灰度
const PAD_VALUE: u8 = 114;

/// YOLO 目标检测器（ultralytics 导出的ONNX模型）
pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    kind: &'static str,
    input_name: String,
    output_name: String, // 动态发现的输出名称
    input_size: u32,
    conf_thresh: f32,
    iou_thresh: f32,
    max_det: usize,
}

impl YoloDetector {
    pub fn new(kind: &'static str, model_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        let loaded = load_session(kind, model_path, onnx_config)?;
        let output_name = loaded.output_names[0].clone();
        tracing::info!("{} model output: '{}'", kind, output_name);

        // 以下阈值属于模型自身的后处理（与 ultralytics 推理默认值一致）
        Ok(Self {
            session: Arc::new(Mutex::new(loaded.session)),
            kind,
            input_name: loaded.input_name,
            output_name,
            input_size: 640,
            conf_thresh: 0.25,
            iou_thresh: 0.7,
            max_det: 300,
        })
    }

    /// 图像预处理：letterbox 缩放、CHW、归一化到 [0,1]
    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::compute(width, height, self.input_size);

        let resized =
            ImageTransforms::resize_linear(image, letterbox.resized_w, letterbox.resized_h);
        let mut canvas =
            RgbImage::from_pixel(self.input_size, self.input_size, Rgb([PAD_VALUE; 3]));
        imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );

        let size = self.input_size as usize;
        let mut input = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        (input, letterbox)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.preprocess(image);

        let input_tensor = Tensor::from_array(input)?;
        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            let prediction = match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(CaneError::MalformedOutput(format!(
                        "{} output '{}' not found. Available outputs: {:?}",
                        self.kind, self.output_name, available_outputs
                    )));
                }
            };
            prediction
        };

        let detections = decode_predictions(
            prediction.view(),
            &letterbox,
            self.conf_thresh,
            self.iou_thresh,
            self.max_det,
        )?;
        tracing::debug!("{} returned {} candidates", self.kind, detections.len());
        Ok(detections)
    }
}

/// letterbox 几何参数，用于把模型坐标映射回源图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_w: u32,
    pub resized_h: u32,
    pub src_w: u32,
    pub src_h: u32,
}

impl Letterbox {
    pub fn compute(src_w: u32, src_h: u32, target: u32) -> Self {
        let gain = (target as f32 / src_h as f32).min(target as f32 / src_w as f32);
        let resized_w = ((src_w as f32 * gain).round() as u32).clamp(1, target);
        let resized_h = ((src_h as f32 * gain).round() as u32).clamp(1, target);
        let dw = (target - resized_w) as f32 / 2.0;
        let dh = (target - resized_h) as f32 / 2.0;
        Self {
            gain,
            pad_x: (dw - 0.1).round().max(0.0) as u32,
            pad_y: (dh - 0.1).round().max(0.0) as u32,
            resized_w,
            resized_h,
            src_w,
            src_h,
        }
    }

    /// 模型坐标 -> 源图坐标，并裁剪到图像范围
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = (x - self.pad_x as f32) / self.gain;
        let sy = (y - self.pad_y as f32) / self.gain;
        (
            sx.clamp(0.0, self.src_w as f32),
            sy.clamp(0.0, self.src_h as f32),
        )
    }
}

/// 解析检测输出
///
/// 支持两种导出格式：原始检测头 `[1, 4+nc, N]`（cx, cy, w, h, 各类别分数），
/// 以及端到端导出 `[1, N, 6]`（x1, y1, x2, y2, score, class）。
/// 结果按模型给出的顺序返回：原始检测头经过 NMS 后按分数降序。
pub fn decode_predictions(
    prediction: ArrayViewD<f32>,
    letterbox: &Letterbox,
    conf_thresh: f32,
    iou_thresh: f32,
    max_det: usize,
) -> Result<Vec<Detection>> {
    let shape = prediction.shape().to_vec();
    let prediction = prediction
        .into_dimensionality::<Ix3>()
        .map_err(|_| CaneError::MalformedOutput(format!("unexpected detection shape {:?}", shape)))?;
    if shape[0] != 1 {
        return Err(CaneError::MalformedOutput(format!(
            "expected batch size 1 for detection, got {:?}",
            shape
        )));
    }

    let mut candidates = Vec::new();
    if shape[2] == 6 && shape[1] > shape[2] {
        // 端到端导出，模型内已完成NMS
        for row in prediction.index_axis(ndarray::Axis(0), 0).outer_iter() {
            let score = row[4];
            if score < conf_thresh {
                continue;
            }
            candidates.push(to_source(letterbox, [row[0], row[1], row[2], row[3]], score, row[5]));
        }
        candidates.truncate(max_det);
        return Ok(candidates);
    }

    if shape[1] < 5 {
        return Err(CaneError::MalformedOutput(format!(
            "unexpected detection shape {:?}",
            shape
        )));
    }

    let num_classes = shape[1] - 4;
    let head = prediction.index_axis(ndarray::Axis(0), 0);
    for anchor in 0..shape[2] {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, head[[4 + c, anchor]]))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < conf_thresh {
            continue;
        }
        let (cx, cy, w, h) = (
            head[[0, anchor]],
            head[[1, anchor]],
            head[[2, anchor]],
            head[[3, anchor]],
        );
        candidates.push(Detection {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
            class_id,
        });
    }

    let kept = non_max_suppression(candidates, iou_thresh, max_det);
    Ok(kept
        .into_iter()
        .map(|d| to_source(letterbox, [d.x1, d.y1, d.x2, d.y2], d.score, d.class_id as f32))
        .collect())
}

fn to_source(letterbox: &Letterbox, coords: [f32; 4], score: f32, class: f32) -> Detection {
    let (x1, y1) = letterbox.to_source(coords[0], coords[1]);
    let (x2, y2) = letterbox.to_source(coords[2], coords[3]);
    Detection {
        x1,
        y1,
        x2,
        y2,
        score,
        class_id: class.max(0.0) as usize,
    }
}

/// 按类别的NMS，输出按分数降序
fn non_max_suppression(mut candidates: Vec<Detection>, iou_thresh: f32, max_det: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_thresh);
        if !suppressed {
            kept.push(candidate);
            if kept.len() >= max_det {
                break;
            }
        }
    }
    kept
}
