// src/handlers/status.rs
use actix_web::{web, HttpResponse};

use crate::notify::Notifier;
use crate::poller::StatusPoller;

pub async fn get_status(poller: web::Data<StatusPoller>) -> HttpResponse {
    HttpResponse::Ok().json(poller.view())
}

pub async fn get_notifications(notifier: web::Data<Notifier>) -> HttpResponse {
    HttpResponse::Ok().json(notifier.recent())
}
