use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

/// Identity established upstream (Telegram init-data HMAC verification or
/// the admin session layer). This service never re-derives it; it only
/// reads the pre-verified headers the edge sets after stripping any
/// client-supplied copies.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: i64,
    pub is_admin: bool,
}

fn user_from_headers(headers: &HeaderMap) -> Option<CurrentUser> {
    let user_id = headers.get("x-user-id")?.to_str().ok()?.parse().ok()?;
    let is_admin = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .map(|role| role == "admin")
        .unwrap_or(false);

    Some(CurrentUser { user_id, is_admin })
}

pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = user_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = user_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
