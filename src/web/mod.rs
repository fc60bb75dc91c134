pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    classify::ClassificationPipeline, media::MediaStore, models::ModelRegistry,
    utils::error::CaneError, Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelRegistry>,
    pub media: MediaStore,
    pub pipeline: ClassificationPipeline,
}

impl AppState {
    pub fn new(config: Config, models: Arc<ModelRegistry>) -> Self {
        let pipeline = ClassificationPipeline::new(Arc::clone(&models), &config.inference_config);
        Self {
            media: MediaStore::new(config.media_dir.clone()),
            config: Arc::new(config),
            models,
            pipeline,
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    // 加载模型注册表
    let models = Arc::new(ModelRegistry::load(&config)?);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        CaneError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    let app = create_app(AppState::new(config, models));

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict/                  - Variety classification (multipart)");
    tracing::info!("  POST /predict-sugar-production/ - Sugar production (JSON)");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  GET  /api/info                  - Service information");

    // 启动服务器
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        CaneError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CaneError::Internal(format!("Server failed to start: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);

    let predict = post(handlers::predict_variety_handler).fallback(handlers::invalid_method);
    let sugar =
        post(handlers::predict_sugar_production_handler).fallback(handlers::invalid_method);

    Router::new()
        // 预测API路由，带或不带结尾斜杠均可
        .route("/predict/", predict.clone())
        .route("/predict", predict)
        .route("/predict-sugar-production/", sugar.clone())
        .route("/predict-sugar-production", sugar)
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        // 添加中间件
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(middleware::json_rejections))
        .layer(CorsLayer::permissive())
        .layer(from_fn(middleware::security_headers))
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.models.health_check()?;
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.models.stats();
    let weights = state.config.inference_config.fusion_weights;
    Json(json!({
        "service": "Sugarcane Classification Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": stats,
        "features": {
            "stem_fusion": stats.has_stem_models,
            "sugar_production": stats.has_sugar_regressor
        },
        "fusion_weights": {
            "bud": weights.bud,
            "stem": weights.stem
        },
        "inference_timeout_secs": state.config.inference_config.model_deadline.as_secs()
    }))
}
