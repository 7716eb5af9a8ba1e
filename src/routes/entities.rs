use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use serde::Deserialize;

use crate::errors::AppError;
use crate::geojson::{self, EntityConverter, FeatureCollection};
use crate::models::EntitiesQuery;
use crate::query::Query;
use crate::registry::ContextRegistry;
use crate::request::ProxiedRequest;
use crate::sources::Entity;

const CONTENT_TYPE_LD_JSON: &str = "application/ld+json;charset=utf-8";

/// The attribute whose GeoProperty value becomes a feature's geometry.
const DEFAULT_GEO_PROPERTY: &str = "location";

const ENTITIES_SEGMENT: &str = "/entities/";
const ATTRS_SEGMENT: &str = "/attrs/";

/// The slice of an entity payload the dispatcher needs for routing; the rest
/// of the body is forwarded untouched.
#[derive(Debug, Deserialize)]
struct EntityFragment {
    id: String,
    #[serde(rename = "type")]
    entity_type: String,
}

/// Create an entity by fanning the request out to every source advertising
/// its type.
#[utoipa::path(
    post,
    path = "/entities",
    tag = "Entities",
    summary = "Create entity",
    description = "Forwards the entity to every context source that advertises its type. \
        The body must carry at least `id`, `type` and `@context`.",
    request_body(content = String, description = "NGSI-LD entity payload"),
    responses(
        (status = 201, description = "Entity created at every matching context source"),
        (status = 400, description = "Malformed payload, no matching context source, or a source rejected the entity")
    )
)]
pub(crate) async fn create_entity(
    registry: web::Data<ContextRegistry>,
    req: HttpRequest,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let request = ProxiedRequest::from_parts(&req, body);
    let fragment: EntityFragment = request
        .decode_body()
        .map_err(|e| AppError::BadRequestData(format!("unable to decode request payload: {}", e)))?;

    let sources = registry.sources_for_entity_type(&fragment.entity_type);
    if sources.is_empty() {
        return Err(AppError::BadRequestData(format!(
            "no context sources found matching the entity type {}",
            fragment.entity_type
        ))
        .into());
    }

    for source in sources {
        source
            .create_entity(&fragment.entity_type, &fragment.id, &request)
            .await
            .map_err(|e| {
                AppError::InvalidRequest(format!(
                    "attempt to create {} entity failed: {}",
                    fragment.entity_type, e
                ))
            })?;
    }

    Ok(HttpResponse::Created().finish())
}

/// Query entities across every context source matching the query.
#[utoipa::path(
    get,
    path = "/entities",
    tag = "Entities",
    summary = "Query entities",
    description = "Fans the query out to every matching context source and concatenates \
        the results in registration order. At least one of `type` or `attrs` is required. \
        With `Accept: application/geo+json` the result is a GeoJSON FeatureCollection.",
    params(EntitiesQuery),
    responses(
        (status = 200, description = "Matching entities as a JSON array or FeatureCollection"),
        (status = 400, description = "Missing type and attrs, or invalid geo parameters"),
        (status = 500, description = "A context source failed while producing entities")
    )
)]
pub(crate) async fn query_entities(
    registry: web::Data<ContextRegistry>,
    req: HttpRequest,
    params: web::Query<EntitiesQuery>,
) -> ActixResult<HttpResponse> {
    let has_types = params.entity_type.as_deref().is_some_and(|t| !t.is_empty());
    let has_attributes = params.attrs.as_deref().is_some_and(|a| !a.is_empty());
    if !has_types && !has_attributes {
        return Err(AppError::BadRequestData(
            "a request for entities must specify at least one of type or attrs".to_string(),
        )
        .into());
    }

    let request = ProxiedRequest::from_parts(&req, web::Bytes::new());
    let query = Query::from_parameters(&params, request)?;

    let sources = registry.sources_for_query(&query);
    let limit = query.limit();
    let mut entities: Vec<Entity> = Vec::new();

    for source in sources {
        source
            .get_entities(&query, &mut |entity| {
                if limit == 0 || entities.len() < limit {
                    entities.push(entity);
                }
                Ok(())
            })
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "failed to get entities from a context source: {}",
                    e
                ))
            })?;

        if limit > 0 && entities.len() >= limit {
            break;
        }
    }

    let accepts_geojson = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.starts_with(geojson::CONTENT_TYPE));

    if accepts_geojson {
        let simplified = params
            .options
            .as_deref()
            .is_some_and(|options| options.split(',').any(|o| o == "keyValues"));
        let converter = EntityConverter::new(DEFAULT_GEO_PROPERTY, simplified);

        let mut collection = FeatureCollection::new(true);
        for entity in &entities {
            collection.push(converter.convert(entity));
        }

        let body = serde_json::to_string(&collection)
            .map_err(|e| AppError::Internal(format!("failed to encode response: {}", e)))?;
        Ok(HttpResponse::Ok()
            .content_type(geojson::CONTENT_TYPE_WITH_CHARSET)
            .body(body))
    } else {
        let body = serde_json::to_string(&entities)
            .map_err(|e| AppError::Internal(format!("failed to encode response: {}", e)))?;
        Ok(HttpResponse::Ok()
            .content_type(CONTENT_TYPE_LD_JSON)
            .body(body))
    }
}

/// Retrieve a single entity from the first source matching its id.
#[utoipa::path(
    get,
    path = "/entities/{id}",
    tag = "Entities",
    summary = "Retrieve entity",
    params(("id" = String, Path, description = "Entity URN", example = "urn:ngsi-ld:Device:livboj")),
    responses(
        (status = 200, description = "The entity as served by its context source"),
        (status = 404, description = "No context source matches the entity id"),
        (status = 500, description = "The context source failed to produce the entity")
    )
)]
pub(crate) async fn retrieve_entity(
    registry: web::Data<ContextRegistry>,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let entity_id = entity_id_from_path(req.path())?.to_string();

    // Only the first matching source is consulted; the rest are ignored.
    let sources = registry.sources_for_entity(&entity_id);
    let Some(source) = sources.into_iter().next() else {
        return Err(AppError::NotFound(format!(
            "no context source found matching the entity id {}",
            entity_id
        ))
        .into());
    };

    let request = ProxiedRequest::from_parts(&req, web::Bytes::new());
    let entity = source
        .retrieve_entity(&entity_id, &request)
        .await
        .map_err(|e| {
            AppError::Internal(format!("failed to retrieve entity {}: {}", entity_id, e))
        })?;

    let body = serde_json::to_string(&entity)
        .map_err(|e| AppError::Internal(format!("failed to encode response: {}", e)))?;
    Ok(HttpResponse::Ok()
        .content_type(CONTENT_TYPE_LD_JSON)
        .body(body))
}

/// Update entity attributes at every source matching the entity id.
#[utoipa::path(
    patch,
    path = "/entities/{id}/attrs/",
    tag = "Entities",
    summary = "Update entity attributes",
    params(("id" = String, Path, description = "Entity URN", example = "urn:ngsi-ld:Device:livboj")),
    request_body(content = String, description = "NGSI-LD attribute fragment payload"),
    responses(
        (status = 204, description = "Attributes updated at every matching context source"),
        (status = 400, description = "Invalid URL or a source rejected the update"),
        (status = 404, description = "No context source matches the entity id")
    )
)]
pub(crate) async fn update_entity_attributes(
    registry: web::Data<ContextRegistry>,
    req: HttpRequest,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let entity_id = entity_id_from_attributes_path(req.path())?.to_string();

    let sources = registry.sources_for_entity(&entity_id);
    if sources.is_empty() {
        return Err(AppError::NotFound(format!(
            "no context source found matching the entity id {}",
            entity_id
        ))
        .into());
    }

    let request = ProxiedRequest::from_parts(&req, body);
    for source in sources {
        source
            .update_entity_attributes(&entity_id, &request)
            .await
            .map_err(|e| {
                AppError::InvalidRequest(format!(
                    "failed to update attributes of entity {}: {}",
                    entity_id, e
                ))
            })?;
    }

    Ok(HttpResponse::NoContent().finish())
}

/// The entity id of a retrieval URL: everything after `/entities/`.
///
/// Deliberately a plain substring search, so the extraction works the same
/// no matter which router mounted the handler.
fn entity_id_from_path(path: &str) -> Result<&str, AppError> {
    let start = path
        .find(ENTITIES_SEGMENT)
        .map(|idx| idx + ENTITIES_SEGMENT.len())
        .ok_or_else(|| AppError::BadRequestData("the supplied URL is invalid".to_string()))?;

    Ok(&path[start..])
}

/// The entity id of an attribute-update URL: the span between `/entities/`
/// and the last `/attrs/`. Missing or mis-ordered markers are invalid.
fn entity_id_from_attributes_path(path: &str) -> Result<&str, AppError> {
    let entities_idx = path.find(ENTITIES_SEGMENT);
    let attrs_idx = path.rfind(ATTRS_SEGMENT);

    match (entities_idx, attrs_idx) {
        (Some(entities_idx), Some(attrs_idx))
            if attrs_idx >= entities_idx + ENTITIES_SEGMENT.len() =>
        {
            Ok(&path[entities_idx + ENTITIES_SEGMENT.len()..attrs_idx])
        }
        _ => Err(AppError::BadRequestData(
            "the supplied URL is invalid".to_string(),
        )),
    }
}
