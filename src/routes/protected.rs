use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::SessionEngine;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;

#[derive(Serialize)]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub created_at: String,
}

/// GET /protected-resource
///
/// Requires a valid access token; the middleware rejects the request with
/// 401 before this handler runs otherwise.
pub async fn protected_resource(
    user: web::ReqData<AuthenticatedUser>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let AuthenticatedUser(user_id) = user.into_inner();
    let user = engine.current_user(user_id).await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        created_at: user.created_at.to_rfc3339(),
    }))
}
