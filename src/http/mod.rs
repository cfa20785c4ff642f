// SPDX-License-Identifier: MPL-2.0

mod error;
mod routes;

pub use error::AppError;

use crate::state::AppState;
use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/engage", post(routes::engage))
        .route("/engagement-state", post(routes::engagement_state))
        .route("/profiles", post(routes::create_profile))
        .route("/profiles/{id}", get(routes::get_profile))
        .route("/posts", post(routes::create_post))
        .route("/posts/{id}", get(routes::get_post).delete(routes::delete_post))
        .route("/posts/{id}/widget", put(routes::put_widget))
        .route("/posts/{id}/audit", get(routes::audit_post))
        .route("/comments", post(routes::create_comment))
        .route(
            "/comments/{id}",
            get(routes::get_comment).delete(routes::delete_comment),
        )
        .route("/replies", post(routes::create_reply))
        .route("/replies/{id}", delete(routes::delete_reply))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
