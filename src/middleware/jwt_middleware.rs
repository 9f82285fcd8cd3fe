/// Access Token Middleware
///
/// Reads the access token from the `accessToken` cookie (or an
/// `Authorization: Bearer` header), verifies it, checks that the caller's
/// address matches the token's `ip` claim, and injects the claims into
/// request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::TokenCodec;
use crate::routes::ACCESS_COOKIE;

pub struct JwtMiddleware {
    codec: TokenCodec,
}

impl JwtMiddleware {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    codec: TokenCodec,
}

fn unauthorized(reason: &'static str, code: &'static str) -> Error {
    let response = HttpResponse::Unauthorized().json(serde_json::json!({
        "error": true,
        "message": format!("Authentication failed: {}", reason),
        "code": code,
    }));
    actix_web::error::InternalError::from_response(reason, response).into()
}

fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match extract_token(&req) {
            Some(token) => token,
            None => {
                tracing::warn!("Missing access token");
                return Box::pin(async { Err(unauthorized("missing access token", "MISSING_TOKEN")) });
            }
        };

        let claims = match self.codec.verify_access_token(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "Access token validation failed");
                return Box::pin(async { Err(unauthorized("invalid access token", "TOKEN_INVALID")) });
            }
        };

        let peer_ip = req.peer_addr().map(|addr| addr.ip().to_string());
        if peer_ip.as_deref() != Some(claims.ip.as_str()) {
            tracing::warn!(
                token_ip = %claims.ip,
                client_ip = ?peer_ip,
                "Access token presented from a different IP"
            );
            return Box::pin(async { Err(unauthorized("invalid access token", "TOKEN_INVALID")) });
        }

        tracing::debug!(client_ip = %claims.ip, "Access token validated");
        req.extensions_mut().insert(claims);

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await })
    }
}
