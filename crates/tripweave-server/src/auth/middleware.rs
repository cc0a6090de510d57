use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::signature;
use crate::error::{AppError, AppResult};
use crate::models::CallerIdentity;
use crate::routes::AppState;

pub const SUBJECT_HEADER: &str = "x-auth-subject";
pub const EMAIL_HEADER: &str = "x-auth-email";
pub const FIRST_NAME_HEADER: &str = "x-auth-first-name";
pub const LAST_NAME_HEADER: &str = "x-auth-last-name";
pub const SIGNATURE_HEADER: &str = "x-auth-signature";

/// Attaches the gateway-asserted [`CallerIdentity`] to the request.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identity_from_headers(
        request.headers(),
        state.config.identity_shared_secret.as_deref(),
    )?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Message the identity gateway signs for each request.
pub fn assertion_message(subject: &str, email: &str) -> String {
    format!("{subject}\n{email}")
}

pub fn identity_from_headers(
    headers: &HeaderMap,
    shared_secret: Option<&str>,
) -> AppResult<CallerIdentity> {
    let subject = header(headers, SUBJECT_HEADER).ok_or(AppError::Unauthenticated)?;
    let email = header(headers, EMAIL_HEADER).ok_or(AppError::Unauthenticated)?;

    if let Some(secret) = shared_secret {
        let provided = header(headers, SIGNATURE_HEADER)
            .and_then(|sig| hex::decode(sig).ok())
            .ok_or(AppError::Unauthenticated)?;
        let message = assertion_message(subject, email);
        if !signature::verify_hmac_sha256(secret.as_bytes(), message.as_bytes(), &provided) {
            tracing::warn!("Rejected identity assertion with bad signature for {subject}");
            return Err(AppError::Unauthenticated);
        }
    }

    Ok(CallerIdentity {
        subject: subject.to_string(),
        email: email.to_lowercase(),
        first_name: header(headers, FIRST_NAME_HEADER).map(str::to_string),
        last_name: header(headers, LAST_NAME_HEADER).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn missing_subject_is_unauthenticated() {
        let err = identity_from_headers(&headers(&[(EMAIL_HEADER, "a@x.io")]), None).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[test]
    fn unsigned_assertion_accepted_without_secret() {
        let identity = identity_from_headers(
            &headers(&[(SUBJECT_HEADER, "user_1"), (EMAIL_HEADER, "Ana@X.io")]),
            None,
        )
        .unwrap();
        assert_eq!(identity.subject, "user_1");
        assert_eq!(identity.email, "ana@x.io");
        assert_eq!(identity.first_name, None);
    }

    #[test]
    fn signed_assertion_checked_against_secret() {
        let mac = signature::hmac_sha256(b"s3cret", assertion_message("user_1", "a@x.io").as_bytes())
            .unwrap();
        let good = hex::encode(mac);

        let ok = identity_from_headers(
            &headers(&[
                (SUBJECT_HEADER, "user_1"),
                (EMAIL_HEADER, "a@x.io"),
                (SIGNATURE_HEADER, &good),
            ]),
            Some("s3cret"),
        );
        assert!(ok.is_ok());

        let forged = identity_from_headers(
            &headers(&[
                (SUBJECT_HEADER, "user_2"),
                (EMAIL_HEADER, "a@x.io"),
                (SIGNATURE_HEADER, &good),
            ]),
            Some("s3cret"),
        );
        assert!(matches!(forged, Err(AppError::Unauthenticated)));

        let unsigned = identity_from_headers(
            &headers(&[(SUBJECT_HEADER, "user_1"), (EMAIL_HEADER, "a@x.io")]),
            Some("s3cret"),
        );
        assert!(matches!(unsigned, Err(AppError::Unauthenticated)));
    }
}
