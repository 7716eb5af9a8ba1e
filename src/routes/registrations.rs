use actix_web::{web, HttpResponse, Result as ActixResult};
use std::sync::Arc;
use validator::Validate;

use crate::errors::AppError;
use crate::models::{ContextSourceRegistration, RegisteredSource};
use crate::registry::ContextRegistry;
use crate::sources::{CompiledRegistration, RemoteContextSource};

/// Register a context source.
#[utoipa::path(
    post,
    path = "/csourceRegistration",
    tag = "Registrations",
    summary = "Register context source",
    description = "Stores the advertisement of a context source. Every `idPattern` is \
        compiled at registration time; a malformed pattern rejects the registration as \
        a whole. Registered sources are immutable for the lifetime of the broker.",
    request_body = ContextSourceRegistration,
    responses(
        (status = 201, description = "The stored registration with its broker-assigned id", body = RegisteredSource),
        (status = 400, description = "Malformed registration payload or invalid idPattern")
    )
)]
pub(crate) async fn register_context_source(
    registry: web::Data<ContextRegistry>,
    client: web::Data<reqwest::Client>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let registration: ContextSourceRegistration = serde_json::from_slice(&body).map_err(|e| {
        AppError::BadRequestData(format!("failed to create registration from payload: {}", e))
    })?;
    registration.validate().map_err(|e| {
        AppError::BadRequestData(format!("failed to create registration from payload: {}", e))
    })?;

    let compiled = CompiledRegistration::new(registration)?;
    let source = RemoteContextSource::new(compiled, client.get_ref().clone());
    let registered = source.describe();

    registry.register(Arc::new(source));

    Ok(HttpResponse::Created().json(registered))
}
