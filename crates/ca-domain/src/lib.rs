pub mod capability;
pub mod config;
pub mod error;
pub mod ids;
pub mod json_fence;
pub mod model;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, Result, ValidationErrorKind};
