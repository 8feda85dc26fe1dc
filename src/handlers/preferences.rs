// src/handlers/preferences.rs
use actix_web::{web, HttpResponse};
use log::debug;
use serde::Deserialize;

use crate::preferences::PreferenceStore;
use crate::utils::RequestError;

#[derive(Deserialize)]
pub struct LanguageBody {
    language: String,
}

pub async fn get_preferences(prefs: web::Data<PreferenceStore>) -> HttpResponse {
    HttpResponse::Ok().json(prefs.snapshot())
}

pub async fn set_language(
    prefs: web::Data<PreferenceStore>,
    body: web::Json<LanguageBody>,
) -> Result<HttpResponse, RequestError> {
    debug!("Switching language to {}", body.language);
    let snapshot = prefs.set_language(body.into_inner().language)?;
    Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn toggle_theme(prefs: web::Data<PreferenceStore>) -> Result<HttpResponse, RequestError> {
    let snapshot = prefs.toggle_theme()?;
    Ok(HttpResponse::Ok().json(snapshot))
}

pub async fn translate(prefs: web::Data<PreferenceStore>, key: web::Path<String>) -> HttpResponse {
    let key = key.into_inner();
    let text = prefs.t(&key);
    HttpResponse::Ok().json(serde_json::json!({
        "key": key,
        "language": prefs.language(),
        "text": text,
    }))
}
