//! Database repositories
//!
//! Free repo functions over `&PgPool`, one module per entity. The variant
//! lookups are the explicit filtered queries the resolver and the reconciler
//! need, backed by the (image_id, width, height, gaussian_blur, brightness,
//! kind) index.

pub mod auth_repo;
pub mod image_repo;
pub mod variant_repo;
