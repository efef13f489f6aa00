use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

/// Uniform JSON body for every response, success or failure.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: bool,
    pub status: u16,
    pub results: usize,
    pub data: Option<T>,
    pub message: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(status: StatusCode, data: T, results: usize) -> Self {
        Self {
            error: false,
            status: status.as_u16(),
            results,
            data: Some(data),
            message: "success".into(),
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: true,
            status: status.as_u16(),
            results: 0,
            data: None,
            message: message.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// `Json` extractor whose rejections come back as validation envelopes.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::validation(rejection_message(&rejection))),
        }
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body".into(),
        other => format!("Invalid request body: {}", other.body_text()),
    }
}
