use crate::image::descriptors::{self, BUD_HOG};
use crate::image::transforms::{ImageTransforms, CANONICAL_SIZE, HUE_RANGE};
use crate::Result;
use image::RgbImage;
use ndarray::Axis;

/// 芽：每通道256箱直方图
const BUD_HIST_BINS: usize = 256;
/// 茎：每通道32箱直方图
const STEM_HIST_BINS: usize = 32;
const STEM_TEXTURE_LEN: usize = 5;

/// 芽特征长度：3x256 直方图 + HOG
pub const BUD_FEATURE_LEN: usize =
    3 * BUD_HIST_BINS + BUD_HOG.descriptor_len(CANONICAL_SIZE as usize, CANONICAL_SIZE as usize);

/// 茎特征长度：6x32 直方图 + 6x2 统计量 + 5 纹理属性
pub const STEM_FEATURE_LEN: usize = 6 * STEM_HIST_BINS + 6 * 2 + STEM_TEXTURE_LEN;

/// 定长特征向量，长度与顺序即分类模型的训练契约
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// 确定性的特征提取，无学习参数
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// 芽特征：RGB直方图 + 灰度HOG
    pub fn bud_features(image: &RgbImage) -> Result<FeatureVector> {
        let resized = ImageTransforms::resize_canonical(image)?;
        let rgb = ImageTransforms::to_array(&resized);

        let mut features = Vec::with_capacity(BUD_FEATURE_LEN);
        for channel in rgb.axis_iter(Axis(2)) {
            features.extend(descriptors::histogram(
                channel.iter().copied(),
                BUD_HIST_BINS,
                256,
            ));
        }

        let gray = ImageTransforms::to_gray(&resized);
        features.extend(descriptors::hog(gray.view(), &BUD_HOG));

        tracing::debug!("Extracted bud features: len={}", features.len());
        Ok(FeatureVector(features))
    }

    /// 茎特征：RGB+HSV直方图、各通道均值/标准差、GLCM纹理
    pub fn stem_features(image: &RgbImage) -> Result<FeatureVector> {
        let resized = ImageTransforms::resize_canonical(image)?;
        let rgb = ImageTransforms::to_array(&resized);
        let hsv = ImageTransforms::to_hsv(&resized);

        // 通道顺序 R, G, B, H, S, V；色调范围为 [0, 180)
        let channels: Vec<(ndarray::ArrayView2<u8>, u32)> = rgb
            .axis_iter(Axis(2))
            .map(|c| (c, 256))
            .chain(
                hsv.axis_iter(Axis(2))
                    .enumerate()
                    .map(|(i, c)| (c, if i == 0 { HUE_RANGE } else { 256 })),
            )
            .collect();

        let mut features = Vec::with_capacity(STEM_FEATURE_LEN);
        for (channel, range) in &channels {
            features.extend(descriptors::histogram(
                channel.iter().copied(),
                STEM_HIST_BINS,
                *range,
            ));
        }
        for (channel, _) in &channels {
            let (mean, std) = descriptors::mean_std(channel.iter().copied());
            features.push(mean);
            features.push(std);
        }

        let gray = ImageTransforms::to_gray(&resized);
        features.extend(descriptors::texture_stats(gray.view()).to_vec());

        tracing::debug!("Extracted stem features: len={}", features.len());
        Ok(FeatureVector(features))
    }
}
