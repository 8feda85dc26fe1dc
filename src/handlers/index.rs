// src/handlers/index.rs
use actix_web::HttpResponse;

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
