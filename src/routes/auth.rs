/// Credential Routes
///
/// Thin handlers over `CredentialService`: registration, login, provide,
/// refresh, and the current session. Tokens travel as HttpOnly,
/// SameSite=Strict cookies.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, CredentialService, IssuedCredentials, RegistrationRequest};
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};
use crate::validators::parse_account_id;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrateRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AccountData {
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub error: bool,
    pub message: String,
    pub data: T,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub ip: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// The TCP peer address; forwarding headers are not trusted.
fn client_ip(req: &HttpRequest) -> Result<String, ValidationError> {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .ok_or(ValidationError::InvalidIp)
}

fn token_cookie(name: &'static str, value: String, ttl_seconds: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(ttl_seconds))
        .finish()
}

fn credentials_response(
    service: &CredentialService,
    issued: IssuedCredentials,
    message: &str,
) -> HttpResponse {
    let codec = service.codec();
    let access = token_cookie(
        ACCESS_COOKIE,
        issued.tokens.access_token,
        codec.access_ttl().num_seconds(),
    );
    let refresh = token_cookie(
        REFRESH_COOKIE,
        issued.tokens.refresh_token,
        codec.refresh_ttl().num_seconds(),
    );

    HttpResponse::Ok()
        .cookie(access)
        .cookie(refresh)
        .json(ApiResponse {
            error: false,
            message: message.to_string(),
            data: AccountData {
                user_id: issued.account_id,
            },
        })
}

fn path_account_id(req: &HttpRequest) -> Result<i64, ValidationError> {
    parse_account_id(req.match_info().get("id").unwrap_or_default())
}

/// POST /registrate
///
/// # Errors
/// - 400: invalid email, short or overlong password
/// - 409: email already registered
pub async fn registrate(
    form: web::Json<RegistrateRequest>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("registration");
    let form = form.into_inner();

    let account_id = service
        .register(RegistrationRequest {
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
            password: form.password,
        })
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = account_id,
        "Registration accepted"
    );

    Ok(HttpResponse::Accepted().json(ApiResponse {
        error: false,
        message: "Account created".to_string(),
        data: AccountData { user_id: account_id },
    }))
}

/// POST /authenticate
///
/// Unknown email and wrong password produce the same 401 body.
pub async fn authenticate(
    req: HttpRequest,
    form: web::Json<AuthenticateRequest>,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("authenticate");
    let ip = client_ip(&req)?;

    let issued = service
        .authenticate(&form.email, &form.password, &ip)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(credentials_response(&service, issued, "Authenticated"))
}

/// GET /provide/{id}
pub async fn provide(
    req: HttpRequest,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let account_id = path_account_id(&req)?;
    let context = ErrorContext::new("provide").with_account_id(account_id);
    let ip = client_ip(&req)?;

    let issued = service.provide(account_id, &ip).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    Ok(credentials_response(&service, issued, "Tokens provided"))
}

/// GET /refresh/{id}
///
/// Reads the `refreshToken` cookie; the presented token is single-use.
pub async fn refresh(
    req: HttpRequest,
    service: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let account_id = path_account_id(&req)?;
    let context = ErrorContext::new("token_refresh").with_account_id(account_id);
    let ip = client_ip(&req)?;

    let presented = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let issued = service
        .refresh(account_id, &presented, &ip)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(credentials_response(&service, issued, "Tokens refreshed"))
}

/// GET /api/session
///
/// Requires a valid access token (see `JwtMiddleware`).
pub async fn session(claims: web::ReqData<AccessClaims>) -> HttpResponse {
    let claims = claims.into_inner();

    HttpResponse::Ok().json(ApiResponse {
        error: false,
        message: "Session active".to_string(),
        data: SessionResponse {
            ip: claims.ip,
            issued_at: claims.iat,
            expires_at: claims.exp,
        },
    })
}
