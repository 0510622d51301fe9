use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod session;
pub mod state;
pub mod store;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
