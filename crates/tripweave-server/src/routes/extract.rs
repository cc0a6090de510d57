//! Request body extraction with failures rendered as [`AppError`].

use axum::extract::{FromRequest, OptionalFromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json<T>` whose rejections use the API's `{success, error}` body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

impl<T, S> OptionalFromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|Json(value)| JsonBody(value)))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{json_body, request, send, test_state};

    #[tokio::test]
    async fn malformed_body_uses_error_envelope() {
        let (state, _) = test_state();
        let mut req = request("POST", "/api/v1/trips", Some("ana"), None);
        req.headers_mut()
            .insert("content-type", "application/json".parse().unwrap());
        *req.body_mut() = axum::body::Body::from("{not json");

        let response = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_uses_error_envelope() {
        let (state, _) = test_state();
        let mut req = request("POST", "/api/v1/trips", Some("ana"), None);
        *req.body_mut() = axum::body::Body::from(json!({ "destination": "Lyon" }).to_string());

        let response = send(&state, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn wrong_field_types_use_error_envelope() {
        let (state, _) = test_state();
        let response = send(
            &state,
            request("POST", "/api/v1/trips", Some("ana"), Some(json!({ "destination": 42 }))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }
}
