//! Community posts persisted in a single JSON document.

pub mod error;
pub mod post;
pub mod store;

pub use error::PostStoreError;
pub use post::{NewPost, Post, ValidPost};
pub use store::PostStore;
