use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extract::AuthUser,
    error::ApiError,
    state::AppState,
    users::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, PublicUser, RegisterRequest,
            UpdateUserRequest,
        },
        service,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

fn require_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        warn!("missing email or password");
        return Err(ApiError::validation("Email and password are required"));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    require_credentials(&payload.email, &payload.password)?;
    let response = service::register(&state, &payload.email, &payload.password).await?;
    info!(user_id = %response.id, email = %response.email, "user registered");
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    require_credentials(&payload.email, &payload.password)?;
    let response = service::login(&state, &payload.email, &payload.password)
        .await
        .map_err(ApiError::for_login)?;
    info!(user_id = %response.id, "user logged in");
    Ok(Json(response))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = service::list_users(&state).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = service::get_user(&state, id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = service::update_user(&state, id, payload).await?;
    info!(user_id = %user.id, "user updated");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    service::delete_user(&state, id).await?;
    info!(user_id = %id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_check_rejects_empty_fields() {
        assert!(require_credentials("", "p1").is_err());
        assert!(require_credentials("a@x.com", "").is_err());
        assert!(require_credentials("   ", "p1").is_err());
        assert!(require_credentials("a@x.com", "p1").is_ok());
    }

    #[test]
    fn auth_response_is_flat() {
        let response = AuthResponse {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            token: "jwt".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert!(json["id"].is_string());
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["token"], "jwt");
    }
}
