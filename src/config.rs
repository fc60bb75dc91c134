use crate::classify::FusionWeights;
use crate::utils::error::CaneError;
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 上传图片与裁剪结果的存放目录
    pub media_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 推理配置
    pub inference_config: InferenceConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// 单次模型调用的截止时间
    pub model_deadline: Duration,

    /// 芽/茎概率融合权重
    pub fusion_weights: FusionWeights,
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        media_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);
        if workers == 0 {
            return Err(CaneError::Config("workers must be at least 1".to_string()));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 50 * 1024 * 1024, // 两张照片，50MB
        };

        let inference_config = InferenceConfig {
            model_deadline: Duration::from_secs(30),
            fusion_weights: FusionWeights::default(),
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            media_dir: PathBuf::from(media_dir),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            inference_config,
        })
    }

    /// 设置单次模型调用截止时间（秒）
    pub fn with_model_deadline(mut self, secs: u64) -> Result<Self> {
        if secs == 0 {
            return Err(CaneError::Config(
                "inference timeout must be at least 1 second".to_string(),
            ));
        }
        self.inference_config.model_deadline = Duration::from_secs(secs);
        Ok(self)
    }

    /// 设置融合权重
    pub fn with_fusion_weights(mut self, bud: f64, stem: f64) -> Result<Self> {
        self.inference_config.fusion_weights = FusionWeights::new(bud, stem)?;
        Ok(self)
    }

    /// 获取芽检测模型路径
    pub fn bud_detector_path(&self) -> PathBuf {
        self.models_dir.join("bud/detector.onnx")
    }

    /// 获取芽分类模型路径
    pub fn bud_classifier_path(&self) -> PathBuf {
        self.models_dir.join("bud/classifier.onnx")
    }

    /// 获取茎检测模型路径
    pub fn stem_detector_path(&self) -> PathBuf {
        self.models_dir.join("stem/detector.onnx")
    }

    /// 获取茎分类模型路径
    pub fn stem_classifier_path(&self) -> PathBuf {
        self.models_dir.join("stem/classifier.onnx")
    }

    /// 获取产糖量回归模型路径
    pub fn production_regressor_path(&self) -> PathBuf {
        self.models_dir.join("production/regressor.onnx")
    }
}
