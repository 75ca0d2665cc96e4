//! Middleware that attaches or requires the acting user.

use super::AuthService;
use crate::context::RequestMeta;
use crate::error::AppError;
use crate::routes::Middleware;
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

fn authorization(req: &Request) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Rejects with 401 unless the bearer token resolves to a user.
pub fn authentication_guard(auth: AuthService) -> Middleware {
    Middleware::from_fn(move |mut req: Request, next: Next| {
        let auth = auth.clone();
        async move {
            match auth.authenticate(authorization(&req).as_deref()).await {
                Ok(user) => {
                    req.extensions_mut().insert(RequestMeta::authenticated(user));
                    next.run(req).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "authentication failed");
                    e.into_response()
                }
            }
        }
    })
}

/// Attaches the user when the token resolves; never rejects.
pub fn fetch_user(auth: AuthService) -> Middleware {
    Middleware::from_fn(move |mut req: Request, next: Next| {
        let auth = auth.clone();
        async move {
            if let Some(header) = authorization(&req) {
                match auth.authenticate(Some(&header)).await {
                    Ok(user) => {
                        req.extensions_mut().insert(RequestMeta::authenticated(user));
                    }
                    Err(e) => tracing::debug!(error = %e, "optional authentication skipped"),
                }
            }
            next.run(req).await
        }
    })
}

/// Admins always pass; other users need one of `roles`. Runs after
/// [`authentication_guard`].
pub fn authorization_guard(roles: &[&str]) -> Middleware {
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    Middleware::from_fn(move |req: Request, next: Next| {
        let roles = roles.clone();
        async move {
            let verdict = match req.extensions().get::<RequestMeta>().and_then(RequestMeta::user) {
                None => Err(AppError::unauthorized("Token not found")),
                Some(user) if user.is_admin || roles.iter().any(|r| user.has_role(r)) => Ok(()),
                Some(_) => Err(AppError::forbidden(format!("Required role {}", roles.join(" or ")))),
            };
            let response: Response = match verdict {
                Ok(()) => next.run(req).await,
                Err(e) => e.into_response(),
            };
            response
        }
    })
}
