use crate::classify::PlantPart;
use crate::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const UPLOAD_DIR: &str = "tmp";
const FALLBACK_NAME: &str = "upload";

/// 上传原图与裁剪结果的落盘存储
///
/// 每个请求使用独立的 UUID 令牌作为文件名前缀，并发请求互不覆盖。
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 为一次请求生成令牌
    pub fn new_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// 保存上传原图：`tmp/<token>_<name>`
    pub async fn save_upload(&self, token: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self
            .root
            .join(UPLOAD_DIR)
            .join(format!("{}_{}", token, sanitize_filename(filename)));
        write_file(&path, bytes).await?;
        Ok(path)
    }

    /// 保存裁剪结果：`cropped_buds/cropped_<token>_<stem>.jpg`
    pub async fn save_crop(
        &self,
        part: PlantPart,
        token: &str,
        filename: &str,
        jpeg: &[u8],
    ) -> Result<PathBuf> {
        let name = sanitize_filename(filename);
        let stem = match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name.as_str(),
        };
        let path = self
            .root
            .join(part.crop_dir())
            .join(format!("cropped_{}_{}.jpg", token, stem));
        write_file(&path, jpeg).await?;
        Ok(path)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    tracing::debug!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// 只保留最后一个路径分量中的安全字符
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(|c| c == '/' || c == '\\')
        .find(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("");

    let sanitized: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .take(100)
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}
