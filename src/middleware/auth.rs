use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the `X-User-Id` header. Trivial identification,
/// not authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

pub fn parse_user_id(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}

pub async fn require_user_id(mut req: Request, next: Next) -> Response {
    let Some(user_id) = parse_user_id(req.headers()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"missing_or_invalid_user_id"})),
        )
            .into_response();
    };

    req.extensions_mut().insert(CurrentUser(user_id));
    next.run(req).await
}
