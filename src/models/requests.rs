use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// The advertisement a context source POSTs to become part of the federation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ContextSourceRegistration {
    #[serde(rename = "type", default = "registration_type")]
    #[schema(example = "ContextSourceRegistration")]
    pub registration_type: String,
    #[validate(custom(function = "crate::validation::validate_endpoint"))]
    #[schema(example = "https://iot.example.com")]
    pub endpoint: String,
    #[validate(length(min = 1, message = "must contain at least one information block"))]
    pub information: Vec<RegistrationInfo>,
}

fn registration_type() -> String {
    "ContextSourceRegistration".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegistrationInfo {
    #[serde(default)]
    pub entities: Vec<EntityInfo>,
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntityInfo {
    #[serde(rename = "type")]
    #[schema(example = "Device")]
    pub entity_type: String,
    #[serde(rename = "idPattern", skip_serializing_if = "Option::is_none")]
    #[schema(example = "^urn:ngsi-ld:Device:.+")]
    pub id_pattern: Option<String>,
}

/// Raw query-string parameters of `GET /entities`. Everything is optional at
/// this level; requiredness and cross-parameter rules live in the query and
/// geo parsers.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EntitiesQuery {
    /// Comma-separated list of entity types.
    #[serde(rename = "type")]
    #[param(example = "WeatherObserved")]
    pub entity_type: Option<String>,
    /// Comma-separated list of attribute names.
    #[param(example = "snowHeight")]
    pub attrs: Option<String>,
    /// Query predicate; only `refDevice=="<urn>"` equality is recognised.
    pub q: Option<String>,
    /// Geospatial relationship, `near` or `within`.
    pub georel: Option<String>,
    /// Geometry type, `Point` or `Polygon`.
    pub geometry: Option<String>,
    /// Bracket-nested lon/lat positions, e.g. `[[8,40],[9,41]]`.
    pub coordinates: Option<String>,
    /// Maximum distance in meters for `near`, e.g. `maxDistance==2000`.
    #[serde(rename = "maxDistance")]
    pub max_distance: Option<String>,
    /// Maximum number of entities to return; 0 or unparseable means unlimited.
    pub limit: Option<String>,
    /// Result offset; the broker applies no offset itself and passes the
    /// parameter through to the context sources inside the forwarded query
    /// string.
    pub offset: Option<String>,
    /// Rendering options; `keyValues` selects the simplified representation.
    pub options: Option<String>,
}
