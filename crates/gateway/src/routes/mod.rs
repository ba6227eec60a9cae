mod detect;
mod health;
mod posts;

pub use detect::AnnotateQuery;

use crate::{errors::ApiError, state::AppState};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    routing::{get, post},
};
use inference::InferenceBackend;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub fn router<B>(state: AppState<B>, max_upload_bytes: usize) -> Router
where
    B: InferenceBackend + Send + 'static,
{
    let uploads = ServeDir::new(state.uploads.dir()).not_found_service(not_found.into_service());

    Router::new()
        .route("/health", get(health::health::<B>))
        .route("/detect", post(detect::detect::<B>))
        .route("/detect_image", post(detect::detect_image::<B>))
        .route(
            "/posts",
            get(posts::list_posts::<B>).post(posts::create_post::<B>),
        )
        .route("/posts/:id", get(posts::get_post::<B>))
        .nest_service(crate::uploads::UPLOADS_ROUTE, uploads)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}
