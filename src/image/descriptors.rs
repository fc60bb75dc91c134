//! 手工特征描述子：颜色直方图、通道统计量、HOG、GLCM纹理
//!
//! 分类模型训练时使用的就是这些定义，任何数值或顺序上的改动
//! 都会让已有模型失效。

use ndarray::{s, Array2, Array3, ArrayView2};

/// 均匀分箱直方图，`range` 为取值上界（不含），返回原始计数
pub fn histogram<I>(values: I, bins: usize, range: u32) -> Vec<f32>
where
    I: IntoIterator<Item = u8>,
{
    let mut hist = vec![0f32; bins];
    for value in values {
        let value = value as usize;
        if value >= range as usize {
            continue;
        }
        let bin = (value * bins / range as usize).min(bins - 1);
        hist[bin] += 1.0;
    }
    hist
}

/// 单通道均值与总体标准差
pub fn mean_std<I>(values: I) -> (f32, f32)
where
    I: IntoIterator<Item = u8>,
{
    let mut count = 0usize;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for value in values {
        let v = value as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean as f32, variance.sqrt() as f32)
}

/// HOG 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HogParams {
    pub orientations: usize,
    pub pixels_per_cell: usize,
    pub cells_per_block: usize,
}

/// 芽特征使用的HOG参数：9方向、8x8像素单元、2x2单元块
pub const BUD_HOG: HogParams = HogParams {
    orientations: 9,
    pixels_per_cell: 8,
    cells_per_block: 2,
};

const L2_HYS_EPS: f64 = 1e-5;
const L2_HYS_CLIP: f64 = 0.2;

impl HogParams {
    /// 给定图像尺寸下的描述子长度
    pub const fn descriptor_len(&self, rows: usize, cols: usize) -> usize {
        let cells_r = rows / self.pixels_per_cell;
        let cells_c = cols / self.pixels_per_cell;
        if cells_r < self.cells_per_block || cells_c < self.cells_per_block {
            return 0;
        }
        let blocks_r = cells_r - self.cells_per_block + 1;
        let blocks_c = cells_c - self.cells_per_block + 1;
        blocks_r * blocks_c * self.cells_per_block * self.cells_per_block * self.orientations
    }
}

/// 方向梯度直方图，块级 L2-Hys 归一化
///
/// 输出顺序为 (块行, 块列, 块内单元行, 块内单元列, 方向)。
pub fn hog(image: ArrayView2<u8>, params: &HogParams) -> Vec<f32> {
    let (rows, cols) = image.dim();
    let cell = params.pixels_per_cell;
    let block = params.cells_per_block;
    let n_orient = params.orientations;
    let cells_r = rows / cell;
    let cells_c = cols / cell;
    if cells_r < block || cells_c < block {
        return Vec::new();
    }

    let image = image.mapv(|v| v as f64);

    // 中心差分，边界梯度置零
    let mut g_row = Array2::<f64>::zeros((rows, cols));
    let mut g_col = Array2::<f64>::zeros((rows, cols));
    for r in 1..rows.saturating_sub(1) {
        for c in 0..cols {
            g_row[[r, c]] = image[[r + 1, c]] - image[[r - 1, c]];
        }
    }
    for r in 0..rows {
        for c in 1..cols.saturating_sub(1) {
            g_col[[r, c]] = image[[r, c + 1]] - image[[r, c - 1]];
        }
    }

    // 无符号方向 [0, 180)
    let bin_width = 180.0 / n_orient as f64;
    let mut cell_hist = Array3::<f64>::zeros((cells_r, cells_c, n_orient));
    for r in 0..cells_r * cell {
        for c in 0..cells_c * cell {
            let (gr, gc) = (g_row[[r, c]], g_col[[r, c]]);
            let magnitude = gr.hypot(gc);
            let orientation = gr.atan2(gc).to_degrees().rem_euclid(180.0);
            let bin = (0..n_orient).find(|&i| {
                orientation >= bin_width * i as f64 && orientation < bin_width * (i + 1) as f64
            });
            if let Some(bin) = bin {
                cell_hist[[r / cell, c / cell, bin]] += magnitude;
            }
        }
    }
    cell_hist.mapv_inplace(|v| v / (cell * cell) as f64);

    let blocks_r = cells_r - block + 1;
    let blocks_c = cells_c - block + 1;
    let mut descriptor = Vec::with_capacity(params.descriptor_len(rows, cols));
    for br in 0..blocks_r {
        for bc in 0..blocks_c {
            let values: Vec<f64> = cell_hist
                .slice(s![br..br + block, bc..bc + block, ..])
                .iter()
                .copied()
                .collect();
            descriptor.extend(l2_hys(values).into_iter().map(|v| v as f32));
        }
    }
    descriptor
}

fn l2_hys(mut values: Vec<f64>) -> Vec<f64> {
    let eps_sq = L2_HYS_EPS * L2_HYS_EPS;
    let norm = (values.iter().map(|v| v * v).sum::<f64>() + eps_sq).sqrt();
    for v in values.iter_mut() {
        *v = (*v / norm).min(L2_HYS_CLIP);
    }
    let norm = (values.iter().map(|v| v * v).sum::<f64>() + eps_sq).sqrt();
    for v in values.iter_mut() {
        *v /= norm;
    }
    values
}

/// GLCM纹理统计量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureStats {
    pub contrast: f64,
    pub dissimilarity: f64,
    pub homogeneity: f64,
    pub energy: f64,
    pub correlation: f64,
}

impl TextureStats {
    pub fn to_vec(&self) -> Vec<f32> {
        [
            self.contrast,
            self.dissimilarity,
            self.homogeneity,
            self.energy,
            self.correlation,
        ]
        .iter()
        .map(|v| *v as f32)
        .collect()
    }
}

const GLCM_LEVELS: usize = 256;

/// 距离1、角度0的对称归一化共生矩阵
pub fn glcm(image: ArrayView2<u8>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let mut matrix = Array2::<f64>::zeros((GLCM_LEVELS, GLCM_LEVELS));
    for r in 0..rows {
        for c in 0..cols.saturating_sub(1) {
            let i = image[[r, c]] as usize;
            let j = image[[r, c + 1]] as usize;
            matrix[[i, j]] += 1.0;
            matrix[[j, i]] += 1.0;
        }
    }
    let total = matrix.sum();
    if total > 0.0 {
        matrix.mapv_inplace(|v| v / total);
    }
    matrix
}

/// 从共生矩阵计算五个纹理属性
pub fn texture_stats(image: ArrayView2<u8>) -> TextureStats {
    let p = glcm(image);

    let mut contrast = 0.0;
    let mut dissimilarity = 0.0;
    let mut homogeneity = 0.0;
    let mut asm = 0.0;
    let mut mean_i = 0.0;
    let mut mean_j = 0.0;
    for ((i, j), &v) in p.indexed_iter() {
        if v == 0.0 {
            continue;
        }
        let d = i as f64 - j as f64;
        contrast += v * d * d;
        dissimilarity += v * d.abs();
        homogeneity += v / (1.0 + d * d);
        asm += v * v;
        mean_i += v * i as f64;
        mean_j += v * j as f64;
    }

    let mut var_i = 0.0;
    let mut var_j = 0.0;
    let mut cov = 0.0;
    for ((i, j), &v) in p.indexed_iter() {
        if v == 0.0 {
            continue;
        }
        let di = i as f64 - mean_i;
        let dj = j as f64 - mean_j;
        var_i += v * di * di;
        var_j += v * dj * dj;
        cov += v * di * dj;
    }
    let (std_i, std_j) = (var_i.sqrt(), var_j.sqrt());
    // 常数图像的相关性定义为 1
    let correlation = if std_i < 1e-15 || std_j < 1e-15 {
        1.0
    } else {
        cov / (std_i * std_j)
    };

    TextureStats {
        contrast,
        dissimilarity,
        homogeneity,
        energy: asm.sqrt(),
        correlation,
    }
}
