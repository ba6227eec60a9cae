pub mod annotate;
pub mod config;
pub mod errors;
pub mod imaging;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod uploads;

pub use config::GatewayConfig;
pub use errors::ApiError;
pub use routes::router;
pub use state::AppState;
