use crate::image::ImageLoader;
use crate::models::BoundingBox;
use crate::Result;
use image::imageops;
use image::RgbImage;
use ndarray::{Array2, Array3};

/// 特征提取前统一缩放到的边长
pub const CANONICAL_SIZE: u32 = 128;

// RGB -> 灰度的定点系数（和为 1 << 14）
const GRAY_R: u32 = 4899;
const GRAY_G: u32 = 9617;
const GRAY_B: u32 = 1868;
const GRAY_SHIFT: u32 = 14;

// 双线性插值权重的定点精度（1 << 11）
const RESIZE_COEF_BITS: u32 = 11;
const RESIZE_COEF_SCALE: f32 = (1 << RESIZE_COEF_BITS) as f32;

const HSV_SHIFT: i64 = 12;
/// 8位HSV中色调的取值上限（度数 / 2）
pub const HUE_RANGE: u32 = 180;

/// 一个输出坐标对应的两个源下标及定点权重
#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearTap {
    i0: usize,
    i1: usize,
    w0: i32,
    w1: i32,
}

fn linear_taps(src: u32, dst: u32) -> Vec<LinearTap> {
    let scale = src as f64 / dst as f64;
    let last = src as i64 - 1;
    (0..dst)
        .map(|d| {
            let f = ((d as f64 + 0.5) * scale - 0.5) as f32;
            let mut i0 = f.floor() as i64;
            let mut frac = f - i0 as f32;
            if i0 < 0 {
                i0 = 0;
                frac = 0.0;
            }
            if i0 >= last {
                i0 = last;
                frac = 0.0;
            }
            LinearTap {
                i0: i0 as usize,
                i1: (i0 + 1).min(last) as usize,
                w0: ((1.0 - frac) * RESIZE_COEF_SCALE).round_ties_even() as i32,
                w1: (frac * RESIZE_COEF_SCALE).round_ties_even() as i32,
            }
        })
        .collect()
}

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 双线性缩放到 128x128，不保持宽高比
    pub fn resize_canonical(image: &RgbImage) -> Result<RgbImage> {
        ImageLoader::ensure_non_empty(image)?;
        Ok(Self::resize_linear(image, CANONICAL_SIZE, CANONICAL_SIZE))
    }

    /// 与 OpenCV `INTER_LINEAR` 逐位一致的缩放
    ///
    /// 每个输出像素只取 2x2 邻域，采样中心 `src = (dst + 0.5) * scale - 0.5`，
    /// 越界时夹到边缘；两轴恰好缩小一半时退化为 2x2 区域平均。
    pub fn resize_linear(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        let (src_w, src_h) = image.dimensions();
        if (src_w, src_h) == (width, height) || src_w == 0 || src_h == 0 {
            return image.clone();
        }
        if src_w == width * 2 && src_h == height * 2 {
            return Self::resize_half_area(image, width, height);
        }

        let x_taps = linear_taps(src_w, width);
        let y_taps = linear_taps(src_h, height);
        let src = image.as_raw();
        let src_stride = src_w as usize * 3;

        // 水平方向：每个源行先插值成目标宽度
        let row_len = width as usize * 3;
        let mut rows = vec![0i32; src_h as usize * row_len];
        for (y, out) in rows.chunks_exact_mut(row_len).enumerate() {
            let line = &src[y * src_stride..(y + 1) * src_stride];
            for (dx, tap) in x_taps.iter().enumerate() {
                for c in 0..3 {
                    out[dx * 3 + c] = line[tap.i0 * 3 + c] as i32 * tap.w0
                        + line[tap.i1 * 3 + c] as i32 * tap.w1;
                }
            }
        }

        // 垂直方向：与 OpenCV 的 8 位定点路径一致
        let mut dst = Vec::with_capacity(height as usize * row_len);
        for tap in &y_taps {
            let r0 = &rows[tap.i0 * row_len..(tap.i0 + 1) * row_len];
            let r1 = &rows[tap.i1 * row_len..(tap.i1 + 1) * row_len];
            for (a, b) in r0.iter().zip(r1) {
                let value = (((tap.w0 * (a >> 4)) >> 16) + ((tap.w1 * (b >> 4)) >> 16) + 2) >> 2;
                dst.push(value.clamp(0, 255) as u8);
            }
        }

        RgbImage::from_raw(width, height, dst).unwrap_or_else(|| RgbImage::new(width, height))
    }

    /// 恰好缩小一半：2x2 区域平均，四舍五入
    fn resize_half_area(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let (sx, sy) = (x * 2, y * 2);
            let mut pixel = [0u8; 3];
            for (c, out) in pixel.iter_mut().enumerate() {
                let sum = image.get_pixel(sx, sy)[c] as u32
                    + image.get_pixel(sx + 1, sy)[c] as u32
                    + image.get_pixel(sx, sy + 1)[c] as u32
                    + image.get_pixel(sx + 1, sy + 1)[c] as u32;
                *out = ((sum + 2) >> 2) as u8;
            }
            image::Rgb(pixel)
        })
    }

    /// 按检测框裁剪
    pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage> {
        ImageLoader::ensure_non_empty(image)?;
        let cropped =
            imageops::crop_imm(image, bbox.x1(), bbox.y1(), bbox.width(), bbox.height()).to_image();
        ImageLoader::ensure_non_empty(&cropped)?;
        Ok(cropped)
    }

    /// 转换为 (H, W, 3) 数组
    pub fn to_array(image: &RgbImage) -> Array3<u8> {
        let (width, height) = image.dimensions();
        let mut array = Array3::<u8>::zeros((height as usize, width as usize, 3));
        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                array[[y as usize, x as usize, c]] = pixel[c];
            }
        }
        array
    }

    /// 灰度化，Y = 0.299R + 0.587G + 0.114B，四舍五入
    pub fn to_gray(image: &RgbImage) -> Array2<u8> {
        let (width, height) = image.dimensions();
        let mut gray = Array2::<u8>::zeros((height as usize, width as usize));
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let value = (r as u32 * GRAY_R
                + g as u32 * GRAY_G
                + b as u32 * GRAY_B
                + (1 << (GRAY_SHIFT - 1)))
                >> GRAY_SHIFT;
            gray[[y as usize, x as usize]] = value.min(255) as u8;
        }
        gray
    }

    /// 8位HSV：H ∈ [0,180)，S、V ∈ [0,255]
    pub fn to_hsv(image: &RgbImage) -> Array3<u8> {
        let (width, height) = image.dimensions();
        let mut hsv = Array3::<u8>::zeros((height as usize, width as usize, 3));
        for (x, y, pixel) in image.enumerate_pixels() {
            let [h, s, v] = Self::rgb_to_hsv_pixel(pixel.0);
            hsv[[y as usize, x as usize, 0]] = h;
            hsv[[y as usize, x as usize, 1]] = s;
            hsv[[y as usize, x as usize, 2]] = v;
        }
        hsv
    }

    /// 单像素转换，定点运算
    pub fn rgb_to_hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
        let (r, g, b) = (r as i64, g as i64, b as i64);
        let v = r.max(g).max(b);
        let vmin = r.min(g).min(b);
        let diff = v - vmin;
        let half = 1i64 << (HSV_SHIFT - 1);

        let s = if v == 0 {
            0
        } else {
            let sdiv = ((255i64 << HSV_SHIFT) as f64 / v as f64).round() as i64;
            (diff * sdiv + half) >> HSV_SHIFT
        };

        let h = if diff == 0 {
            0
        } else {
            let raw = if v == r {
                g - b
            } else if v == g {
                b - r + 2 * diff
            } else {
                r - g + 4 * diff
            };
            let hdiv = ((HUE_RANGE as i64) << HSV_SHIFT) as f64 / (6.0 * diff as f64);
            let mut h = (raw * hdiv.round() as i64 + half) >> HSV_SHIFT;
            if h < 0 {
                h += HUE_RANGE as i64;
            }
            h
        };

        // 与 OpenCV 一样饱和到 u8；色调直方图会丢弃 >= 180 的值
        [h.clamp(0, 255) as u8, s.clamp(0, 255) as u8, v as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn resize_produces_canonical_square() {
        let image = RgbImage::from_pixel(300, 77, Rgb([1, 2, 3]));
        let resized = ImageTransforms::resize_canonical(&image).unwrap();
        assert_eq!(resized.dimensions(), (CANONICAL_SIZE, CANONICAL_SIZE));
        assert_eq!(resized.get_pixel(64, 64), &Rgb([1, 2, 3]));
    }

    #[test]
    fn resize_rejects_empty_image() {
        let image = RgbImage::new(0, 10);
        assert!(ImageTransforms::resize_canonical(&image).is_err());
    }

    #[test]
    fn crop_takes_box_region() {
        let mut image = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        image.put_pixel(4, 3, Rgb([255, 0, 0]));
        let bbox = BoundingBox::new(4, 3, 7, 8).unwrap();
        let cropped = ImageTransforms::crop(&image, &bbox).unwrap();
        assert_eq!(cropped.dimensions(), (3, 5));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn gray_matches_luma_weights() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        image.put_pixel(1, 0, Rgb([255, 0, 0]));
        image.put_pixel(2, 0, Rgb([0, 0, 255]));
        let gray = ImageTransforms::to_gray(&image);
        assert_eq!(gray[[0, 0]], 255);
        assert_eq!(gray[[0, 1]], 76);
        assert_eq!(gray[[0, 2]], 29);
    }

    #[test]
    fn hsv_of_primary_colours() {
        assert_eq!(ImageTransforms::rgb_to_hsv_pixel([255, 0, 0]), [0, 255, 255]);
        assert_eq!(ImageTransforms::rgb_to_hsv_pixel([0, 255, 0]), [60, 255, 255]);
        assert_eq!(ImageTransforms::rgb_to_hsv_pixel([0, 0, 255]), [120, 255, 255]);
        assert_eq!(ImageTransforms::rgb_to_hsv_pixel([90, 90, 90]), [0, 0, 90]);
        assert_eq!(ImageTransforms::rgb_to_hsv_pixel([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn array_layout_is_height_width_channel() {
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(3, 1, Rgb([7, 8, 9]));
        let array = ImageTransforms::to_array(&image);
        assert_eq!(array.dim(), (2, 4, 3));
        assert_eq!(array[[1, 3, 2]], 9);
    }

    #[test]
    fn linear_resize_samples_two_nearest_columns() {
        // 每 4 列一条亮线：缩小 4 倍时采样第 4k+1 和 4k+2 列，都是暗的
        let image = RgbImage::from_fn(512, 512, |x, _| {
            if x % 4 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let resized = ImageTransforms::resize_canonical(&image).unwrap();
        for x in 0..4 {
            assert_eq!(resized.get_pixel(x, 0), &Rgb([0, 0, 0]));
        }

        // 亮线移到第 4k+1 列：两点各占一半，255/2 四舍五入为 128
        let image = RgbImage::from_fn(512, 512, |x, _| {
            if x % 4 == 1 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let resized = ImageTransforms::resize_canonical(&image).unwrap();
        assert_eq!(resized.get_pixel(5, 7), &Rgb([128, 128, 128]));
    }

    #[test]
    fn linear_upscale_clamps_edges() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([200, 200, 200]));
        let resized = ImageTransforms::resize_linear(&image, 4, 1);
        let row: Vec<u8> = (0..4).map(|x| resized.get_pixel(x, 0)[0]).collect();
        assert_eq!(row, vec![0, 50, 150, 200]);
    }

    #[test]
    fn exact_half_uses_area_average() {
        let image = RgbImage::from_fn(256, 256, |x, y| {
            let v = (1 + x % 2 + 2 * (y % 2)) as u8;
            Rgb([v, v * 10, 0])
        });
        let resized = ImageTransforms::resize_canonical(&image).unwrap();
        // (1 + 2 + 3 + 4 + 2) >> 2 = 3，(10 + 20 + 30 + 40 + 2) >> 2 = 25
        assert_eq!(resized.get_pixel(17, 90), &Rgb([3, 25, 0]));
    }

    #[test]
    fn same_size_resize_is_identity() {
        let image = RgbImage::from_fn(128, 128, |x, y| Rgb([x as u8, y as u8, 7]));
        assert_eq!(ImageTransforms::resize_canonical(&image).unwrap(), image);
    }

    #[test]
    fn hue_is_not_folded_into_last_bin() {
        // 接近红色但偏蓝：负色调回卷到 179 附近，而不是被截断
        let [h, _, _] = ImageTransforms::rgb_to_hsv_pixel([255, 0, 5]);
        assert_eq!(h, 179);
        for r in (0..=255u16).step_by(15) {
            for g in (0..=255u16).step_by(15) {
                for b in (0..=255u16).step_by(15) {
                    let [h, _, _] = ImageTransforms::rgb_to_hsv_pixel([r as u8, g as u8, b as u8]);
                    assert!((h as u32) <= HUE_RANGE, "{:?} -> {}", (r, g, b), h);
                }
            }
        }
    }
}
