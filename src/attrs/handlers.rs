use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    error::{ApiError, JsonBody},
    state::AppState,
    validation::object_id,
};

use super::{
    dto::{AttrRequest, ListParams},
    repo::{self, Attr, AttrKind},
};

/// List, retrieve, update and delete for one kind. Rows are only ever created
/// through recipe payloads, so the collection has no POST.
pub fn routes(kind: AttrKind) -> Router<AppState> {
    let base = match kind {
        AttrKind::Tag => "/recipe/tags",
        AttrKind::Ingredient => "/recipe/ingredients",
    };
    Router::new()
        .route(
            &format!("{base}/"),
            get(move |st: State<AppState>, user: AuthUser, q: Query<ListParams>| {
                list(kind, st, user, q)
            }),
        )
        .route(
            &format!("{base}/:id/"),
            get(move |st: State<AppState>, user: AuthUser, id: Path<String>| {
                retrieve(kind, st, user, id)
            })
            .put(
                move |st: State<AppState>,
                      user: AuthUser,
                      id: Path<String>,
                      body: JsonBody<AttrRequest>| { update(kind, st, user, id, body, false) },
            )
            .patch(
                move |st: State<AppState>,
                      user: AuthUser,
                      id: Path<String>,
                      body: JsonBody<AttrRequest>| { update(kind, st, user, id, body, true) },
            )
            .delete(move |st: State<AppState>, user: AuthUser, id: Path<String>| {
                destroy(kind, st, user, id)
            }),
        )
}

#[instrument(skip(state, params))]
async fn list(
    kind: AttrKind,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Attr>>, ApiError> {
    let assigned_only = params.assigned_only()?;
    let rows = repo::list(&state.db, kind, user_id, assigned_only).await?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
async fn retrieve(
    kind: AttrKind,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Attr>, ApiError> {
    let id = object_id(&id)?;
    repo::get(&state.db, kind, user_id, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[instrument(skip(state, payload))]
async fn update(
    kind: AttrKind,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<AttrRequest>,
    partial: bool,
) -> Result<Json<Attr>, ApiError> {
    let id = object_id(&id)?;
    let Some(name) = payload.into_name(partial)? else {
        return repo::get(&state.db, kind, user_id, id)
            .await?
            .map(Json)
            .ok_or(ApiError::NotFound);
    };

    match repo::rename(&state.db, kind, user_id, id, &name).await {
        Ok(Some(row)) => {
            info!(%user_id, id, kind = kind.label(), "renamed");
            Ok(Json(row))
        }
        Ok(None) => Err(ApiError::NotFound),
        Err(e) if crate::db::is_unique_violation(&e) => Err(ApiError::field(
            "name",
            format!("You already have a {} with this name.", kind.label()),
        )),
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state))]
async fn destroy(
    kind: AttrKind,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = object_id(&id)?;
    if !repo::delete(&state.db, kind, user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    info!(%user_id, id, kind = kind.label(), "deleted");
    Ok(StatusCode::NO_CONTENT)
}
