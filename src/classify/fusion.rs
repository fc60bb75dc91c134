use crate::classify::types::ProbabilityDistribution;
use crate::utils::error::CaneError;
use crate::Result;

/// 芽/茎两路概率的融合权重
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub bud: f64,
    pub stem: f64,
}

impl FusionWeights {
    pub fn new(bud: f64, stem: f64) -> Result<Self> {
        if !bud.is_finite() || !stem.is_finite() {
            return Err(CaneError::Config(format!(
                "fusion weights must be finite, got bud={} stem={}",
                bud, stem
            )));
        }
        if bud < 0.0 || stem < 0.0 {
            return Err(CaneError::Config(format!(
                "fusion weights must be non-negative, got bud={} stem={}",
                bud, stem
            )));
        }
        if bud + stem <= 0.0 {
            return Err(CaneError::Config(
                "fusion weights must not both be zero".to_string(),
            ));
        }
        Ok(Self { bud, stem })
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { bud: 0.5, stem: 0.5 }
    }
}

/// 按权重逐类融合两路概率：p = (wb*pb + ws*ps) / (wb + ws)
///
/// 两路分布的类别数必须一致，否则视为模型配置错误。
pub fn fuse(
    bud: &ProbabilityDistribution,
    stem: &ProbabilityDistribution,
    weights: FusionWeights,
) -> Result<ProbabilityDistribution> {
    if bud.len() != stem.len() {
        return Err(CaneError::Inference(format!(
            "cannot fuse distributions of different lengths: bud={} stem={}",
            bud.len(),
            stem.len()
        )));
    }

    let total = weights.bud + weights.stem;
    let fused = bud
        .as_slice()
        .iter()
        .zip(stem.as_slice())
        .map(|(b, s)| (weights.bud * b + weights.stem * s) / total)
        .collect();

    ProbabilityDistribution::new(fused)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(values: &[f64]) -> ProbabilityDistribution {
        ProbabilityDistribution::new(values.to_vec()).unwrap()
    }

    fn assert_close(a: &ProbabilityDistribution, b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.as_slice().iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn equal_weights_average_per_class() {
        let fused = fuse(
            &dist(&[0.1, 0.7, 0.1, 0.1]),
            &dist(&[0.2, 0.6, 0.1, 0.1]),
            FusionWeights::default(),
        )
        .unwrap();
        assert_close(&fused, &[0.15, 0.65, 0.1, 0.1]);

        let prediction = fused.prediction();
        assert_eq!(prediction.class.index(), 1);
        assert_eq!(prediction.variety(), "SL 03 336");
        assert!((prediction.confidence - 65.0).abs() < 1e-6);
    }

    #[test]
    fn fusing_with_itself_is_identity() {
        let p = dist(&[0.05, 0.25, 0.3, 0.4]);
        assert_close(&fuse(&p, &p, FusionWeights::default()).unwrap(), p.as_slice());
    }

    #[test]
    fn fused_distribution_sums_to_one() {
        let fused = fuse(
            &dist(&[0.9, 0.05, 0.05, 0.0]),
            &dist(&[0.0, 0.1, 0.2, 0.7]),
            FusionWeights::new(0.3, 0.7).unwrap(),
        )
        .unwrap();
        assert!((fused.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn equal_weights_are_symmetric() {
        let a = dist(&[0.6, 0.2, 0.2]);
        let b = dist(&[0.1, 0.1, 0.8]);
        let w = FusionWeights::default();
        assert_close(&fuse(&a, &b, w).unwrap(), fuse(&b, &a, w).unwrap().as_slice());
    }

    #[test]
    fn scaling_weights_does_not_change_result() {
        let a = dist(&[0.6, 0.2, 0.2]);
        let b = dist(&[0.1, 0.1, 0.8]);
        let small = fuse(&a, &b, FusionWeights::new(1.0, 3.0).unwrap()).unwrap();
        let large = fuse(&a, &b, FusionWeights::new(10.0, 30.0).unwrap()).unwrap();
        assert_close(&small, large.as_slice());
    }

    #[test]
    fn zero_stem_weight_keeps_bud_distribution() {
        let a = dist(&[0.6, 0.3, 0.1]);
        let b = dist(&[0.1, 0.1, 0.8]);
        let fused = fuse(&a, &b, FusionWeights::new(1.0, 0.0).unwrap()).unwrap();
        assert_close(&fused, a.as_slice());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = fuse(
            &dist(&[0.5, 0.5]),
            &dist(&[0.2, 0.3, 0.5]),
            FusionWeights::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CaneError::Inference(_)));
    }

    #[test]
    fn degenerate_weights_are_rejected() {
        assert!(FusionWeights::new(0.0, 0.0).is_err());
        assert!(FusionWeights::new(-0.1, 1.0).is_err());
        assert!(FusionWeights::new(f64::NAN, 1.0).is_err());
        assert!(FusionWeights::new(f64::INFINITY, 1.0).is_err());
    }
}
