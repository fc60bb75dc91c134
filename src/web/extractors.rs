use crate::production::{AgronomicInputs, SugarProductionRequest};
use crate::utils::error::CaneError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

/// 请求体验证：把原始请求转换为已校验的领域值
pub trait Validate {
    type Validated;

    fn validate(self) -> crate::Result<Self::Validated>;
}

/// 验证的JSON提取器
pub struct ValidatedJson<T: Validate>(pub T::Validated);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = CaneError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|err| {
            if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                CaneError::PayloadTooLarge
            } else {
                CaneError::InvalidInput(format!("JSON parse error: {}", err.body_text()))
            }
        })?;

        Ok(ValidatedJson(value.validate()?))
    }
}

impl Validate for SugarProductionRequest {
    type Validated = AgronomicInputs;

    fn validate(self) -> crate::Result<AgronomicInputs> {
        self.parse()
    }
}

/// 请求ID提取器：优先使用 `X-Request-ID` 头
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}
