//! 模型能力接口
//!
//! 推理后端（ONNX Runtime）只通过这里的 trait 暴露给流水线，
//! 测试中可以换成不做真实推理的替身实现。

use crate::Result;
use image::RgbImage;

/// 检测模型输出的一个候选区域（源图像素坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// 裁剪用的整数边界框，保证 x1 < x2、y1 < y2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// 浮点框截断为整数并裁到图像范围内，退化为空框时返回 None
    pub fn from_detection(detection: &Detection, width: u32, height: u32) -> Option<Self> {
        let coords = [detection.x1, detection.y1, detection.x2, detection.y2];
        if coords.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let clamp = |v: f32, max: u32| (v.trunc().max(0.0) as u32).min(max);
        Self::new(
            clamp(detection.x1, width),
            clamp(detection.y1, height),
            clamp(detection.x2, width),
            clamp(detection.y2, height),
        )
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// 目标检测能力：返回模型给出的全部候选框，顺序即模型输出顺序
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// 概率分类能力
pub trait Classifier: Send + Sync {
    /// 训练时的特征维度
    fn input_dim(&self) -> usize;

    /// 每个类别的概率，按类别下标排列
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;
}

/// 回归能力：输入顺序为 (sunshine, soil_temp, temp_max)
pub trait Regressor: Send + Sync {
    fn predict(&self, inputs: [f32; 3]) -> Result<f32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            score: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn bounding_box_requires_positive_extent() {
        assert!(BoundingBox::new(0, 0, 1, 1).is_some());
        assert!(BoundingBox::new(5, 0, 5, 10).is_none());
        assert!(BoundingBox::new(0, 9, 4, 3).is_none());
    }

    #[test]
    fn detection_coordinates_are_truncated_and_clamped() {
        let bbox = BoundingBox::from_detection(&det(-3.7, 2.9, 120.8, 40.2), 100, 50).unwrap();
        assert_eq!((bbox.x1(), bbox.y1()), (0, 2));
        assert_eq!((bbox.width(), bbox.height()), (100, 38));
    }

    #[test]
    fn degenerate_or_non_finite_detection_yields_none() {
        assert!(BoundingBox::from_detection(&det(10.2, 10.0, 10.9, 20.0), 100, 100).is_none());
        assert!(BoundingBox::from_detection(&det(f32::NAN, 0.0, 10.0, 10.0), 100, 100).is_none());
        assert!(BoundingBox::from_detection(&det(150.0, 0.0, 200.0, 10.0), 100, 100).is_none());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = det(0.0, 0.0, 10.0, 10.0);
        let b = det(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
        let half = det(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }
}
