use anyhow::{Context, Result};
use clap::Parser;
use sugarcane_classify::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sugarcane-classify")]
#[command(about = "Sugarcane variety classification and sugar production service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Directory for uploaded and cropped images
    #[arg(long, default_value = "media")]
    media_dir: String,

    /// Per-call model inference deadline in seconds
    #[arg(long, default_value_t = 30)]
    inference_timeout: u64,

    /// Fusion weight of the bud classifier
    #[arg(long, default_value_t = 0.5)]
    bud_weight: f64,

    /// Fusion weight of the stem classifier
    #[arg(long, default_value_t = 0.5)]
    stem_weight: f64,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting sugarcane classification service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);
    tracing::info!("Media directory: {}", args.media_dir);

    // 创建配置
    let config = Config::new(
        args.bind,
        args.models_dir,
        args.media_dir,
        args.workers,
        args.dev,
    )?
    .with_model_deadline(args.inference_timeout)?
    .with_fusion_weights(args.bud_weight, args.stem_weight)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    // 启动服务器
    runtime.block_on(serve(config))?;

    Ok(())
}
