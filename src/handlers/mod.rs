//! HTTP handlers for the serving tier

pub mod guards;
pub mod images;

pub use images::{get, get_thumbnail, get_with_height, get_with_width, upload};
