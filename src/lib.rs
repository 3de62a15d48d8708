//! Image Service
//!
//! Serving tier for images in multiple resolutions and encodings. Missing
//! raster variants are generated on demand inside the request; expensive
//! re-encoding (AVIF/WebP) is offloaded to out-of-process workers coordinated
//! over durable AMQP queues.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod services;
pub mod storage;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
