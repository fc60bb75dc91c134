use crate::{
    classify::{round2, PlantPart, VarietyResponse},
    image::ImageLoader,
    media::MediaStore,
    production::{SugarProduction, SugarProductionPredictor, SugarProductionRequest},
    utils::{error::CaneError, run_blocking},
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::Json,
};
use image::RgbImage;
use std::time::Instant;

/// 一个上传的图片字段
#[derive(Debug)]
struct Upload {
    filename: String,
    data: Bytes,
}

/// 解析出的品种识别表单
#[derive(Debug, Default)]
struct VarietyForm {
    bud: Option<Upload>,
    stem: Option<Upload>,
}

async fn read_variety_form(mut multipart: Multipart) -> Result<VarietyForm> {
    let mut form = VarietyForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        let part = match field_name.as_str() {
            name if name == PlantPart::Bud.field_name() => PlantPart::Bud,
            name if name == PlantPart::Stem.field_name() => PlantPart::Stem,
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
                continue;
            }
        };

        // 验证内容类型
        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
                return Err(CaneError::UnsupportedFormat(content_type.to_string()));
            }
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}.jpg", part));

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file data", e))?;
        tracing::debug!("Received {}: {} ({} bytes)", field_name, filename, data.len());

        let upload = Some(Upload { filename, data });
        match part {
            PlantPart::Bud => form.bud = upload,
            PlantPart::Stem => form.stem = upload,
        }
    }

    Ok(form)
}

/// 请求体超限时 multer 报告 413
fn multipart_error(context: &str, err: MultipartError) -> CaneError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CaneError::PayloadTooLarge
    } else {
        CaneError::InvalidInput(format!("{}: {}", context, err))
    }
}

async fn decode(state: &AppState, data: Bytes) -> Result<RgbImage> {
    run_blocking(
        "image decode",
        state.config.inference_config.model_deadline,
        move || ImageLoader::from_bytes(&data),
    )
    .await
}

/// 裁剪结果落盘并编码为base64
async fn persist_crop(
    media: &MediaStore,
    part: PlantPart,
    token: &str,
    filename: &str,
    crop: &RgbImage,
) -> Result<String> {
    let jpeg = ImageLoader::encode_jpeg(crop)?;
    media.save_crop(part, token, filename, &jpeg).await?;
    Ok(ImageLoader::to_base64(&jpeg))
}

/// 品种识别处理器：`bud_image` 必填，`stem_image` 可选
pub async fn predict_variety_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<VarietyResponse>> {
    let start_time = Instant::now();
    tracing::info!("Processing variety request: request_id={}", request_id);

    // 非multipart请求等同于没有上传芽图片
    let form = match multipart {
        Ok(multipart) => read_variety_form(multipart).await?,
        Err(rejection) => {
            tracing::debug!("Multipart rejected: {}", rejection);
            VarietyForm::default()
        }
    };

    let bud = form
        .bud
        .ok_or_else(|| CaneError::MissingField("Bud image is required".to_string()))?;

    let token = MediaStore::new_token();
    state
        .media
        .save_upload(&token, &bud.filename, &bud.data)
        .await?;
    if let Some(stem) = &form.stem {
        state
            .media
            .save_upload(&token, &stem.filename, &stem.data)
            .await?;
    }

    let bud_image = decode(&state, bud.data).await?;
    let stem_image = match form.stem.as_ref() {
        Some(stem) => Some(decode(&state, stem.data.clone()).await?),
        None => None,
    };

    let outcome = state.pipeline.run(bud_image, stem_image).await?;

    let cropped_bud_image = persist_crop(
        &state.media,
        PlantPart::Bud,
        &token,
        &bud.filename,
        &outcome.bud.crop,
    )
    .await?;
    let cropped_stem_image = match (&outcome.stem, &form.stem) {
        (Some(stem_outcome), Some(stem)) => Some(
            persist_crop(
                &state.media,
                PlantPart::Stem,
                &token,
                &stem.filename,
                &stem_outcome.crop,
            )
            .await?,
        ),
        _ => None,
    };

    tracing::info!(
        "Variety request completed: request_id={}, variety={}, confidence={:.2}, time={:.3}s",
        request_id,
        outcome.prediction.variety(),
        outcome.prediction.confidence,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(VarietyResponse {
        variety: outcome.prediction.variety().to_string(),
        confidence: round2(outcome.prediction.confidence),
        cropped_bud_image,
        cropped_stem_image,
    }))
}

/// 产糖量预测处理器
pub async fn predict_sugar_production_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(inputs): ValidatedJson<SugarProductionRequest>,
) -> Result<Json<SugarProduction>> {
    tracing::info!(
        "Processing sugar production request: request_id={}, inputs={:?}",
        request_id,
        inputs
    );

    let regressor = state.models.sugar_regressor().ok_or_else(|| {
        CaneError::ModelUnavailable("sugar production model is not loaded".to_string())
    })?;
    let predictor =
        SugarProductionPredictor::new(regressor, state.config.inference_config.model_deadline);
    let result = predictor.predict(inputs).await?;

    tracing::info!(
        "Sugar production request completed: request_id={}, predicted={} {}",
        request_id,
        result.predicted_sugar_production,
        result.unit
    );
    Ok(Json(result))
}

/// 非POST请求
pub async fn invalid_method() -> CaneError {
    CaneError::InvalidMethod
}
