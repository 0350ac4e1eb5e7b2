use utoipa_axum::{router::OpenApiRouter, routes};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/grading", grading_routes())
}

fn grading_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::grading::dispatch_submission))
        .routes(routes!(handlers::grading::dispatch_project))
        .routes(routes!(handlers::grading::dispatch_assignment))
        .routes(routes!(handlers::grading::evaluate_result))
        .routes(routes!(handlers::grading::dispatch_pending))
        .routes(routes!(handlers::grading::queue_status))
        .routes(routes!(handlers::grading::get_result))
        .routes(routes!(handlers::grading::list_submission_results))
}
