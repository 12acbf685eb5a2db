use axum::Router;
use axum::routing::get;
use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod range;
pub mod service;
pub mod static_file;


pub fn router() -> Router<AppState> {
    Router::new().route("/stream/{asset_id}", get(handler::stream_asset))
}
