use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const CONTENT_TYPE: &str = "application/geo+json";
pub const CONTENT_TYPE_WITH_CHARSET: &str = "application/geo+json;charset=utf-8";

const NGSI_LD_CONTEXT: [&str; 2] = [
    "https://schema.lab.fiware.org/ld/context",
    "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld",
];

/// The GeoJSON envelope returned for `Accept: application/geo+json` queries.
#[derive(Debug, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    collection_type: &'static str,
    pub features: Vec<Value>,
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    context: Option<Vec<String>>,
}

impl FeatureCollection {
    pub fn new(include_context: bool) -> Self {
        Self {
            collection_type: "FeatureCollection",
            features: Vec::new(),
            context: include_context
                .then(|| NGSI_LD_CONTEXT.iter().map(|c| c.to_string()).collect()),
        }
    }

    pub fn push(&mut self, feature: Value) {
        self.features.push(feature);
    }
}

#[derive(Deserialize)]
struct RawFeatureCollection {
    #[serde(default)]
    features: Vec<Value>,
}

/// Decode a `FeatureCollection` payload and hand each feature to the callback.
pub fn unpack_feature_collection<E>(
    bytes: &[u8],
    callback: &mut dyn FnMut(Value) -> Result<(), E>,
) -> Result<(), E>
where
    E: From<serde_json::Error>,
{
    let collection: RawFeatureCollection = serde_json::from_slice(bytes)?;
    for feature in collection.features {
        callback(feature)?;
    }

    Ok(())
}

/// Projects context entities into GeoJSON features.
///
/// Features arriving verbatim from a remote GeoJSON source pass through
/// untouched; entities carrying a GeoProperty under the configured property
/// name are converted; anything else degrades to a minimal feature stub.
pub struct EntityConverter {
    property: String,
    simplified: bool,
}

impl EntityConverter {
    pub fn new(property: &str, simplified: bool) -> Self {
        Self {
            property: property.to_string(),
            simplified,
        }
    }

    pub fn convert(&self, entity: &Value) -> Value {
        if is_feature(entity) {
            return entity.clone();
        }

        self.feature_from_entity(entity)
            .unwrap_or_else(|| json!({ "type": "Feature" }))
    }

    fn feature_from_entity(&self, entity: &Value) -> Option<Value> {
        let members = entity.as_object()?;
        let geo_property = members.get(&self.property)?;
        if geo_property.get("type").and_then(Value::as_str) != Some("GeoProperty") {
            return None;
        }
        let geometry = geo_property.get("value")?.clone();

        let mut properties = Map::new();
        if let Some(entity_type) = members.get("type") {
            properties.insert("type".to_string(), entity_type.clone());
        }
        for (name, value) in members {
            if name == "id" || name == "type" || name == "@context" || name == &self.property {
                continue;
            }
            let projected = if self.simplified {
                value.get("value").cloned().unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            };
            properties.insert(name.clone(), projected);
        }

        let mut feature = Map::new();
        if let Some(id) = members.get("id") {
            feature.insert("id".to_string(), id.clone());
        }
        feature.insert("type".to_string(), Value::String("Feature".to_string()));
        feature.insert("geometry".to_string(), geometry);
        feature.insert("properties".to_string(), Value::Object(properties));

        Some(Value::Object(feature))
    }
}

fn is_feature(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("Feature")
        && value.get("geometry").is_some()
}
