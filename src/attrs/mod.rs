//! Tags and ingredients: per-user labels attached to recipes.

mod dto;
mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub use repo::{Attr, AttrKind};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::routes(AttrKind::Tag))
        .merge(handlers::routes(AttrKind::Ingredient))
}
