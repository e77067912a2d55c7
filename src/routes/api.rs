//! REST route configuration

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Create the REST router
///
/// # Endpoint
///
/// `GET /` - Health check, also reports the live call count
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(health_check))
}
