use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{password::verify_password, AuthUser, JwtKeys},
    error::{ApiError, JsonBody, NON_FIELD_ERRORS},
    state::AppState,
};

use super::{
    dto::{TokenRequest, TokenResponse, UserRequest, UserResponse},
    repo::{NewUser, User},
};

const DUPLICATE_EMAIL: &str = "user with this email already exists.";
const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/user/create/", post(create_user))
        .route("/user/token/", post(create_token))
        .route("/user/me/", get(get_me).put(put_me).patch(patch_me))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let reg = payload.into_registration()?;

    if User::email_taken(&state.db, &reg.email, None).await? {
        warn!(email = %reg.email, "email already registered");
        return Err(ApiError::field("email", DUPLICATE_EMAIL));
    }

    let new = NewUser::regular(&reg.email, &reg.password)
        .map_err(|e| ApiError::field("email", e.to_string()))?
        .with_name(reg.name);

    let user = match User::create(&state.db, new).await {
        Ok(u) => u,
        Err(e) if crate::db::is_unique_violation(&e) => {
            return Err(ApiError::field("email", DUPLICATE_EMAIL));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (email, password) = payload.into_credentials()?;

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) if u.is_active => u,
        Some(u) => {
            warn!(user_id = %u.id, "login for inactive user");
            return Err(ApiError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS));
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS));
        }
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS));
    }

    let token = JwtKeys::from(&state.config.jwt).sign(user.id)?;
    info!(user_id = %user.id, "token issued");
    Ok(Json(TokenResponse { token }))
}

async fn current_user(state: &AppState, user_id: uuid::Uuid) -> Result<User, ApiError> {
    User::find_by_id(&state.db, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            warn!(%user_id, "token for missing or inactive user");
            ApiError::InvalidToken
        })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = current_user(&state, user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn put_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<UserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    update_me(state, user_id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<UserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    update_me(state, user_id, payload, true).await
}

async fn update_me(
    state: AppState,
    user_id: uuid::Uuid,
    payload: UserRequest,
    partial: bool,
) -> Result<Json<UserResponse>, ApiError> {
    let user = current_user(&state, user_id).await?;
    let changes = payload.into_changes(partial)?;

    if let Some(email) = changes.email.as_deref() {
        if User::email_taken(&state.db, email, Some(user.id)).await? {
            return Err(ApiError::field("email", DUPLICATE_EMAIL));
        }
    }

    let updated = match User::update(&state.db, user.id, changes).await {
        Ok(u) => u,
        Err(e) if crate::db::is_unique_violation(&e) => {
            return Err(ApiError::field("email", DUPLICATE_EMAIL));
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}
