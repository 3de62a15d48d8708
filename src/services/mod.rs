//! Service layer: the pipelines behind the HTTP handlers and the bins

pub mod encoder;
pub mod processor;
pub mod reconcile;
pub mod resolver;
pub mod results;
pub mod upload;
pub mod variants;
pub mod worker;
