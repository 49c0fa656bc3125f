use thiserror::Error;
use warp::http::StatusCode;
use warp::{reject::Reject, Rejection, Reply};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Document store error: {0}")]
    StoreError(String),

    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError { provider: String, message: String },

    #[error("Vector index error ({backend}): {message}")]
    VectorIndexError { backend: String, message: String },

    #[error("Language model error ({provider}): {message}")]
    ModelError { provider: String, message: String },

    #[error("Upstream rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Name of the external collaborator that failed, if any. Used as a metric label.
    pub fn upstream(&self) -> Option<&'static str> {
        match self {
            ApiError::StoreError(_) => Some("store"),
            ApiError::EmbeddingError { .. } => Some("embedding"),
            ApiError::VectorIndexError { .. } => Some("vector_index"),
            ApiError::ModelError { .. } => Some("model"),
            ApiError::RateLimitExceeded(_) => Some("rate_limit"),
            ApiError::RedisError(_) => Some("redis"),
            ApiError::HttpError(_) => Some("http"),
            _ => None,
        }
    }

    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            ApiError::RateLimitExceeded(_) => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
            }
            ApiError::ConfigError(_)
            | ApiError::SerializationError(_)
            | ApiError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            _ => (StatusCode::BAD_GATEWAY, "Upstream service failure"),
        }
    }
}

/// Maps a non-success upstream status to the matching error, reading the body for details.
pub async fn upstream_error(
    response: reqwest::Response,
    make: impl FnOnce(String) -> ApiError,
) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ApiError::RateLimitExceeded(body);
    }
    make(format!("{status}: {body}"))
}

impl Reject for ApiError {}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

pub async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = api_err.status();

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        Ok(warp::reply::with_status(json, code))
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let json = warp::reply::json(&serde_json::json!({
            "error": "Bad request",
            "details": body_err.to_string(),
        }));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_failures_map_to_bad_gateway() {
        let err = ApiError::ModelError {
            provider: "openai".into(),
            message: "401: invalid key".into(),
        };
        assert_eq!(err.status().0, StatusCode::BAD_GATEWAY);
        assert_eq!(err.upstream(), Some("model"));
    }

    #[test]
    fn test_client_errors_keep_their_status() {
        assert_eq!(
            ApiError::NotFound("session".into()).status().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("empty".into()).status().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::BadRequest("empty".into()).upstream(), None);
    }

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        reqwest::Response::from(
            warp::http::Response::builder()
                .status(status)
                .body(body)
                .unwrap(),
        )
    }

    fn model_error(message: String) -> ApiError {
        ApiError::ModelError {
            provider: "openai".into(),
            message,
        }
    }

    #[tokio::test]
    async fn test_provider_throttling_surfaces_as_too_many_requests() {
        let err = upstream_error(response(429, "slow down"), model_error).await;

        assert!(matches!(&err, ApiError::RateLimitExceeded(body) if body == "slow down"));
        assert_eq!(err.status().0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.upstream(), Some("rate_limit"));

        let reply = handle_rejection(warp::reject::custom(err)).await.unwrap();
        assert_eq!(reply.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_other_provider_failures_keep_the_service_label() {
        let err = upstream_error(response(500, "boom"), model_error).await;

        assert!(matches!(&err, ApiError::ModelError { message, .. } if message.contains("500")));
        assert_eq!(err.status().0, StatusCode::BAD_GATEWAY);
        assert_eq!(err.upstream(), Some("model"));
    }
}
