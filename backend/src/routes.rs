use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use log::{error, info};
use shared::ClassificationResult;

use crate::error::PredictError;
use crate::inference::classifier::Classifier;
use crate::storage::upload_store::UploadStore;

/// Multipart field names that carry the image. The web UI posts `image`.
const FILE_FIELDS: [&str; 2] = ["file", "image"];

#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_upload_bytes: usize,
}

struct Upload {
    data: Vec<u8>,
    file_name: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(handle_predict)));
}

/// Any origin, method and header.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, PredictError> {
    while let Some(mut field) = payload.try_next().await? {
        let is_file = field
            .name()
            .map(|name| FILE_FIELDS.contains(&name))
            .unwrap_or(false);
        if !is_file {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > limit {
                return Err(PredictError::PayloadTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(Upload { data, file_name });
    }
    Err(PredictError::MissingFile)
}

async fn predict(
    classifier: web::Data<Classifier>,
    store: web::Data<UploadStore>,
    limits: web::Data<UploadLimits>,
    payload: Multipart,
) -> Result<ClassificationResult, PredictError> {
    let upload = read_upload(payload, limits.max_upload_bytes).await?;

    // The raw upload is kept even if it later fails to decode.
    let record = store
        .persist(&upload.data, upload.file_name.as_deref())
        .await?;
    log::debug!(
        "Upload {} persisted with extension {:?}",
        record.id,
        record.extension
    );

    let data = upload.data;
    let decision = web::block(move || classifier.classify(&data)).await??;

    info!(
        "Classified {} as {} (confidence {:.4}, class index {})",
        record.path.display(),
        decision.prediction,
        decision.confidence,
        decision.index
    );

    Ok(ClassificationResult {
        prediction: decision.prediction.to_string(),
        confidence: decision.confidence,
        image_path: record.path.display().to_string(),
    })
}

async fn handle_predict(
    classifier: web::Data<Classifier>,
    store: web::Data<UploadStore>,
    limits: web::Data<UploadLimits>,
    payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    match predict(classifier, store, limits, payload).await {
        Ok(result) => Ok(HttpResponse::Ok().json(result)),
        Err(e) => {
            error!("Prediction failed: {:?}", e);
            Err(e)
        }
    }
}
