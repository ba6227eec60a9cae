pub mod post;

pub use post::{PostProcessor, TransformParams, non_maximum_suppression};
