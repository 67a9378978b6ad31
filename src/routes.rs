// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{exams, session, students},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges the sub-routers (exams, session).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, config, session service).
pub fn create_router(state: AppState) -> Router {
    let origin: axum::http::HeaderValue = state
        .config
        .cors_origin
        .parse()
        .expect("Invalid CORS_ORIGIN");

    let cors = CorsLayer::new()
        .allow_origin([origin])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let exam_routes = Router::new()
        .route("/", get(exams::list_exams).post(exams::create_exam))
        .route("/{id}", get(exams::get_exam))
        .route("/{id}/results", get(exams::list_exam_results))
        .route("/{id}/summary", get(exams::exam_summary))
        .route(
            "/{id}/students",
            get(students::list_students).post(students::enroll_student),
        );

    let session_routes = Router::new()
        .route("/", get(session::get_session))
        .route("/load", post(session::load_session))
        .route("/draw", post(session::draw_question))
        .route("/start", post(session::start_examination))
        .route("/end", post(session::end_examination))
        .route("/grade", post(session::submit_grade));

    Router::new()
        .nest("/api/exams", exam_routes)
        .nest("/api/session", session_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
