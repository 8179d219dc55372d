/// Authentication Routes
///
/// Registration, login, and refresh token rotation. All three answer with
/// the same token body; failures are rendered by [`AppError`].

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{Session, SessionEngine};
use crate::error::{AppError, ErrorContext};
use crate::logger::RequestId;
use crate::middleware::bearer_token;

/// Email/password body for register and login, sent as JSON or as an
/// urlencoded form
///
/// Fields are optional so that a missing field is reported by the engine
/// rather than by the JSON extractor.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// JSON is tried first, so a body that is neither reports the JSON error
pub type CredentialsBody = web::Either<web::Json<CredentialsRequest>, web::Form<CredentialsRequest>>;

/// Token pair response
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "_id")]
    pub id: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(session: Session, expires_in: i64) -> Self {
        Self {
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            id: session.user_id.to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Context tagged with the id assigned by the logging middleware, if any
pub(crate) fn request_context(req: &HttpRequest, operation: &str) -> ErrorContext {
    let context = ErrorContext::new(operation);
    match req.extensions().get::<RequestId>() {
        Some(RequestId(id)) => context.with_request_id(id.clone()),
        None => context,
    }
}

fn token_response(session: Session, engine: &SessionEngine) -> HttpResponse {
    let expires_in = engine.issuer().access_token_expiry();
    HttpResponse::Ok().json(AuthResponse::new(session, expires_in))
}

/// POST /register
///
/// # Errors
/// - 400: missing/empty/malformed email or password, or email already registered
/// - 500: internal server error
pub async fn register(
    req: HttpRequest,
    form: CredentialsBody,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = request_context(&req, "user_registration");
    let form = form.into_inner();

    let session = engine
        .register(form.email.as_deref(), form.password.as_deref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = %session.user_id,
        "Registration completed"
    );

    Ok(token_response(session, &engine))
}

/// POST /login
///
/// # Errors
/// - 400: invalid credentials (unknown email and wrong password look the same)
/// - 500: internal server error
pub async fn login(
    req: HttpRequest,
    form: CredentialsBody,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = request_context(&req, "user_login");
    let form = form.into_inner();

    let session = engine
        .login(form.email.as_deref(), form.password.as_deref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = %session.user_id,
        "Login completed"
    );

    Ok(token_response(session, &engine))
}

/// GET /refresh
///
/// Exchanges `Authorization: Bearer <refresh_token>` for a new pair. A token
/// that is no longer the user's current one revokes the session.
///
/// # Errors
/// - 403: missing, invalid, unknown-user, or superseded refresh token
/// - 500: internal server error
pub async fn refresh(
    req: HttpRequest,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = request_context(&req, "token_refresh");

    let session = engine.renew(bearer_token(req.headers())).await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        user_id = %session.user_id,
        "Token refresh completed"
    );

    Ok(token_response(session, &engine))
}
