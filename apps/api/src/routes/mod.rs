pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::campaign::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Campaign lifecycle
        .route(
            "/api/v1/jobs/:job_id/campaign",
            post(handlers::handle_open_campaign)
                .get(handlers::handle_get_campaign)
                .delete(handlers::handle_stop_campaign),
        )
        // Queue operations
        .route(
            "/api/v1/jobs/:job_id/campaign/candidates",
            post(handlers::handle_enqueue),
        )
        .route(
            "/api/v1/jobs/:job_id/campaign/entries/:entry_id/retry",
            post(handlers::handle_retry_entry),
        )
        .route(
            "/api/v1/jobs/:job_id/campaign/entries/:entry_id",
            delete(handlers::handle_remove_entry),
        )
        // Conducted interviews
        .route(
            "/api/v1/jobs/:job_id/campaign/interviews",
            get(handlers::handle_list_interviews),
        )
        .with_state(state)
}
