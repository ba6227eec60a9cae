use crate::state::AppState;
use axum::{Json, extract::State};
use inference::InferenceBackend;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    device: &'static str,
    model: String,
}

pub async fn health<B>(State(state): State<AppState<B>>) -> Json<Health>
where
    B: InferenceBackend + Send + 'static,
{
    Json(Health {
        status: "ok",
        device: state.device.as_str(),
        model: state.model_name.to_string(),
    })
}
