// src/handlers/social.rs
use actix_web::{web, HttpResponse};

use crate::social::SocialStats;
use crate::utils::RequestError;

pub async fn social_stats(social: web::Data<SocialStats>) -> Result<HttpResponse, RequestError> {
    let stats = social.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}
