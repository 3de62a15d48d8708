//! HTTP endpoints: upload and the read path

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::handlers::guards;
use crate::models::{Image, KindFilter};
use crate::queue::Broker;
use crate::services::resolver::{Resolution, ResolveRequest, Resolver};
use crate::services::upload::Uploader;
use crate::storage::S3Store;

/// Blur/brightness query parameters shared by every read endpoint
#[derive(Debug, serde::Deserialize)]
pub struct RenderParams {
    #[serde(default)]
    pub gaussian_blur: f64,
    #[serde(default = "default_brightness")]
    pub brightness: f64,
}

fn default_brightness() -> f64 {
    1.0
}

/// `POST /upload` — multipart form with a `file` field
pub async fn upload(
    pool: web::Data<PgPool>,
    store: web::Data<S3Store>,
    broker: web::Data<Broker>,
    req: HttpRequest,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    guards::require_can_upload_image(&pool, &req).await?;

    let (filename, data) = read_file_field(&mut payload).await?;

    let uploader = Uploader {
        pool: &pool,
        store: store.get_ref(),
        broker: &broker,
    };

    let outcome = uploader.upload(&filename, data).await?;

    let mut status = if outcome.created {
        HttpResponse::Created()
    } else {
        HttpResponse::Ok()
    };

    Ok(status.json(&outcome))
}

async fn read_file_field(payload: &mut Multipart) -> Result<(String, Bytes)> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::BadRequest(format!("bad multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("upload")
            .to_string();

        let mut data = BytesMut::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| AppError::BadRequest(format!("bad multipart body: {e}")))?
        {
            data.extend_from_slice(&chunk);
        }

        return Ok((filename, data.freeze()));
    }

    Err(AppError::BadRequest("missing file field".into()))
}

/// `GET /{image_id}/{kind}` — full size
pub async fn get(
    pool: web::Data<PgPool>,
    store: web::Data<S3Store>,
    broker: web::Data<Broker>,
    config: web::Data<Config>,
    path: web::Path<(Uuid, String)>,
    params: web::Query<RenderParams>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (image_id, kind) = path.into_inner();
    let image = guards::resolve_image(&pool, image_id).await?;
    let (width, height) = (image.width, image.height);

    serve(&pool, &store, &broker, &config, &req, &image, &kind, width, height, &params).await
}

/// `GET /{image_id}/{kind}/thumbnail` — 600 px bounding box
pub async fn get_thumbnail(
    pool: web::Data<PgPool>,
    store: web::Data<S3Store>,
    broker: web::Data<Broker>,
    config: web::Data<Config>,
    path: web::Path<(Uuid, String)>,
    params: web::Query<RenderParams>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (image_id, kind) = path.into_inner();
    let image = guards::resolve_image(&pool, image_id).await?;
    let (width, height) = image.thumbnail_size();

    serve(
        &pool, &store, &broker, &config, &req, &image, &kind, width as i32, height as i32, &params,
    )
    .await
}

/// `GET /{image_id}/height/{height}/{kind}`
pub async fn get_with_height(
    pool: web::Data<PgPool>,
    store: web::Data<S3Store>,
    broker: web::Data<Broker>,
    config: web::Data<Config>,
    path: web::Path<(Uuid, i32, String)>,
    params: web::Query<RenderParams>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (image_id, height, kind) = path.into_inner();
    let image = guards::resolve_image(&pool, image_id).await?;
    let (width, height) = image.dims_for_height(height);

    serve(&pool, &store, &broker, &config, &req, &image, &kind, width, height, &params).await
}

/// `GET /{image_id}/width/{width}/{kind}`
pub async fn get_with_width(
    pool: web::Data<PgPool>,
    store: web::Data<S3Store>,
    broker: web::Data<Broker>,
    config: web::Data<Config>,
    path: web::Path<(Uuid, i32, String)>,
    params: web::Query<RenderParams>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (image_id, width, kind) = path.into_inner();
    let image = guards::resolve_image(&pool, image_id).await?;
    let (width, height) = image.dims_for_width(width);

    serve(&pool, &store, &broker, &config, &req, &image, &kind, width, height, &params).await
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    pool: &PgPool,
    store: &S3Store,
    broker: &Broker,
    config: &Config,
    req: &HttpRequest,
    image: &Image,
    kind: &str,
    width: i32,
    height: i32,
    params: &RenderParams,
) -> Result<HttpResponse> {
    let filter = KindFilter::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown kind {kind}")))?;

    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    let resolver = Resolver {
        pool,
        store,
        broker,
        public_base: &config.s3.public_base_path,
    };

    let resolution = resolver
        .resolve(
            image,
            ResolveRequest {
                width,
                height,
                gaussian_blur: params.gaussian_blur,
                brightness: params.brightness,
                filter,
            },
            accept,
        )
        .await?;

    match resolution {
        Resolution::Redirect(url) => Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, url))
            .finish()),
        Resolution::NotAvailable => Ok(HttpResponse::NotFound()
            .json(serde_json::json!({ "error": "Image version not available" }))),
    }
}
