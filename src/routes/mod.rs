pub mod entities;
pub mod health;
pub mod registrations;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/csourceRegistration",
        web::post().to(registrations::register_context_source),
    )
    .route("/entities", web::post().to(entities::create_entity))
    .route("/entities", web::get().to(entities::query_entities))
    .route("/entities/{id}", web::get().to(entities::retrieve_entity))
    .route(
        "/entities/{id}/attrs/",
        web::patch().to(entities::update_entity_attributes),
    )
    .route("/health", web::get().to(health::health));
}
