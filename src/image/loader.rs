use crate::utils::error::CaneError;
use crate::Result;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// 单张上传图片的大小上限
pub const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从字节流加载图像，统一转为RGB
    pub fn from_bytes(bytes: &[u8]) -> Result<RgbImage> {
        // 检查文件大小
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(CaneError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }

        if bytes.is_empty() {
            return Err(CaneError::Decode("empty upload".to_string()));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| CaneError::Decode("unrecognized image data".to_string()))?;
        if !Self::is_supported_format(format) {
            return Err(CaneError::UnsupportedFormat(format!("{:?}", format)));
        }

        let image = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
        Self::ensure_non_empty(&image)?;

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 只接受JPEG和PNG
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(format, ImageFormat::Png | ImageFormat::Jpeg)
    }

    /// 空图像无法检测或提特征
    pub fn ensure_non_empty(image: &RgbImage) -> Result<()> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CaneError::Decode(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }
        Ok(())
    }

    /// 编码为JPEG字节
    pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
        tracing::debug!(
            "Encoded {}x{} image as JPEG ({} bytes)",
            image.width(),
            image.height(),
            buffer.len()
        );
        Ok(buffer)
    }

    pub fn to_base64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn decodes_png_to_rgb() {
        let image = ImageLoader::from_bytes(&png_bytes(7, 5)).unwrap();
        assert_eq!(image.dimensions(), (7, 5));
        assert_eq!(image.get_pixel(3, 2), &Rgb([10, 200, 30]));
    }

    #[test]
    fn rejects_garbage_and_empty_uploads() {
        assert!(matches!(
            ImageLoader::from_bytes(b"definitely not an image"),
            Err(CaneError::Decode(_))
        ));
        assert!(matches!(
            ImageLoader::from_bytes(&[]),
            Err(CaneError::Decode(_))
        ));
    }

    #[test]
    fn rejects_other_formats() {
        // GIF 文件头
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";
        assert!(matches!(
            ImageLoader::from_bytes(gif),
            Err(CaneError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn jpeg_roundtrip_keeps_dimensions() {
        let image = RgbImage::from_pixel(16, 9, Rgb([120, 80, 40]));
        let jpeg = ImageLoader::encode_jpeg(&image).unwrap();
        assert_eq!(ImageLoader::detect_format(&jpeg), Some(ImageFormat::Jpeg));
        let decoded = ImageLoader::from_bytes(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (16, 9));
        assert!(!ImageLoader::to_base64(&jpeg).is_empty());
    }
}
