use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{AuthResponse, PublicUser, UpdateUserRequest},
        repo::User,
    },
};

/// Canonical form used for every uniqueness comparison and store lookup.
pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        warn!(email = %email, "register invalid email");
        return Err(ApiError::validation("Invalid email"));
    }

    // Pre-check; the UNIQUE constraint in `User::create` covers the race.
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(password)?;
    let user = User::create(&state.db, &email, &hash).await?;

    let token = JwtKeys::from_ref(state).issue(user.id)?;
    Ok(AuthResponse {
        id: user.id,
        email: user.email,
        token,
    })
}

/// Unknown email and wrong password stay distinct here; the login handler
/// folds them together before anything reaches the wire.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(email);
    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::UserNotFound);
        }
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(state).issue(user.id)?;
    Ok(AuthResponse {
        id: user.id,
        email: user.email,
        token,
    })
}

pub async fn list_users(state: &AppState) -> Result<Vec<PublicUser>, ApiError> {
    let users = User::list_all(&state.db).await?;
    Ok(users.into_iter().map(PublicUser::from).collect())
}

pub async fn get_user(state: &AppState, id: Uuid) -> Result<PublicUser, ApiError> {
    User::find_by_id(&state.db, id)
        .await?
        .map(PublicUser::from)
        .ok_or(ApiError::UserNotFound)
}

pub async fn update_user(
    state: &AppState,
    id: Uuid,
    changes: UpdateUserRequest,
) -> Result<PublicUser, ApiError> {
    let email = match changes.email.as_deref() {
        Some(raw) => {
            let email = normalize_email(raw);
            // Updating to the record's own current email is allowed.
            if let Some(owner) = User::find_by_email(&state.db, &email).await? {
                if owner.id != id {
                    warn!(user_id = %id, "update email owned by another user");
                    return Err(ApiError::DuplicateEmail);
                }
            }
            Some(email)
        }
        None => None,
    };

    let password_hash = match changes.password.as_deref() {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };

    let user = User::update(&state.db, id, email.as_deref(), password_hash.as_deref()).await?;
    Ok(PublicUser::from(user))
}

pub async fn delete_user(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    User::delete(&state.db, id).await
}


#[cfg(test)]
mod store_tests {
    use super::*;
    use crate::config::{AppConfig, JwtConfig};
    use sqlx::PgPool;
    use std::sync::Arc;

    fn make_state(db: PgPool) -> AppState {
        AppState {
            db,
            config: Arc::new(AppConfig {
                database_url: String::new(),
                jwt: JwtConfig {
                    secret: "test-secret".into(),
                    issuer: "test-issuer".into(),
                    audience: "test-aud".into(),
                    ttl_hours: 24,
                },
            }),
        }
    }

    #[sqlx::test]
    async fn registering_the_same_email_twice_conflicts(pool: PgPool) {
        let state = make_state(pool);
        register(&state, "a@x.com", "p1").await.expect("first register");
        // Normalized variant must collide with the stored record.
        let err = register(&state, "  A@X.com ", "p2").await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));
    }

    #[sqlx::test]
    async fn register_then_login_roundtrip(pool: PgPool) {
        let state = make_state(pool);
        let registered = register(&state, "a@x.com", "p1").await.expect("register");
        let logged_in = login(&state, "a@x.com", "p1").await.expect("login");
        assert_eq!(logged_in.id, registered.id);
        assert_eq!(logged_in.email, "a@x.com");

        // The login token carries the same identity and authorizes a lookup.
        let claims = JwtKeys::from_ref(&state)
            .verify(&logged_in.token)
            .expect("verify token");
        assert_eq!(claims.sub, registered.id);
        let user = get_user(&state, claims.sub).await.expect("get user");
        assert_eq!(user.id, registered.id);
    }

    #[sqlx::test]
    async fn login_failures_stay_distinct_internally(pool: PgPool) {
        let state = make_state(pool);
        register(&state, "a@x.com", "p1").await.expect("register");

        let unknown = login(&state, "nobody@x.com", "p1").await.unwrap_err();
        assert!(matches!(unknown, ApiError::UserNotFound));

        let wrong = login(&state, "a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(wrong, ApiError::InvalidCredentials));
    }

    #[sqlx::test]
    async fn update_email_conflicts_only_with_another_owner(pool: PgPool) {
        let state = make_state(pool);
        register(&state, "a@x.com", "p1").await.expect("register a");
        let b = register(&state, "b@x.com", "p2").await.expect("register b");

        let err = update_user(
            &state,
            b.id,
            UpdateUserRequest {
                email: Some("a@x.com".into()),
                password: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateEmail));

        // The record's own current email is not a conflict.
        let updated = update_user(
            &state,
            b.id,
            UpdateUserRequest {
                email: Some("B@x.com".into()),
                password: None,
            },
        )
        .await
        .expect("update to own email");
        assert_eq!(updated.id, b.id);
        assert_eq!(updated.email, "b@x.com");
    }

    #[sqlx::test]
    async fn update_rehashes_password_and_keeps_other_fields(pool: PgPool) {
        let state = make_state(pool);
        let user = register(&state, "a@x.com", "old-pass").await.expect("register");

        update_user(
            &state,
            user.id,
            UpdateUserRequest {
                email: None,
                password: Some("new-pass".into()),
            },
        )
        .await
        .expect("update password");

        let relogin = login(&state, "a@x.com", "new-pass").await.expect("login new");
        assert_eq!(relogin.id, user.id);
        let stale = login(&state, "a@x.com", "old-pass").await.unwrap_err();
        assert!(matches!(stale, ApiError::InvalidCredentials));
    }

    #[sqlx::test]
    async fn deleting_twice_reports_not_found(pool: PgPool) {
        let state = make_state(pool);
        let user = register(&state, "a@x.com", "p1").await.expect("register");

        delete_user(&state, user.id).await.expect("first delete");
        let err = delete_user(&state, user.id).await.unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));

        let gone = get_user(&state, user.id).await.unwrap_err();
        assert!(matches!(gone, ApiError::UserNotFound));
    }
}
