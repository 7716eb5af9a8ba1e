use crate::errors::AppError;
use crate::geo::GeoQuery;
use crate::models::EntitiesQuery;
use crate::request::ProxiedRequest;

const REF_DEVICE_PREFIX: &str = "refDevice==\"";

/// A parsed entity query, handed to every matching context source.
///
/// The buffered original request rides along so that remote sources can
/// reverse-proxy it without reassembling the query string.
#[derive(Debug, Clone)]
pub struct Query {
    types: Vec<String>,
    attributes: Vec<String>,
    device: Option<String>,
    geo: Option<GeoQuery>,
    limit: usize,
    request: ProxiedRequest,
}

impl Query {
    pub fn from_parameters(
        params: &EntitiesQuery,
        request: ProxiedRequest,
    ) -> Result<Self, AppError> {
        let geo = match params.georel.as_deref() {
            Some(georel) if !georel.is_empty() => Some(GeoQuery::from_parameters(
                georel,
                params.geometry.as_deref(),
                params.max_distance.as_deref(),
                params.coordinates.as_deref(),
            )?),
            _ => None,
        };

        Ok(Self {
            types: split_parameter_list(params.entity_type.as_deref()),
            attributes: split_parameter_list(params.attrs.as_deref()),
            device: params
                .q
                .as_deref()
                .and_then(device_reference)
                .map(str::to_string),
            geo,
            limit: parse_count(params.limit.as_deref()),
            request,
        })
    }

    pub fn entity_types(&self) -> &[String] {
        &self.types
    }

    pub fn entity_attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn geo(&self) -> Option<&GeoQuery> {
        self.geo.as_ref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn request(&self) -> &ProxiedRequest {
        &self.request
    }
}

/// A comma-separated parameter list; an absent parameter becomes a single
/// empty string, meaning "unrestricted".
fn split_parameter_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Extract the quoted id from a `refDevice=="<id>"` predicate. Any other
/// predicate shape is ignored without error.
fn device_reference(q: &str) -> Option<&str> {
    let quoted = q.strip_prefix(REF_DEVICE_PREFIX)?;
    let end = quoted.find('"')?;
    Some(&quoted[..end])
}

/// Unsigned decimal parameter; unparseable values silently default to zero.
fn parse_count(value: Option<&str>) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use bytes::Bytes;

    fn empty_params() -> EntitiesQuery {
        EntitiesQuery {
            entity_type: None,
            attrs: None,
            q: None,
            georel: None,
            geometry: None,
            coordinates: None,
            max_distance: None,
            limit: None,
            offset: None,
            options: None,
        }
    }

    fn request() -> ProxiedRequest {
        let req = TestRequest::get()
            .uri("/ngsi-ld/v1/entities")
            .to_http_request();
        ProxiedRequest::from_parts(&req, Bytes::new())
    }

    #[test]
    fn extracts_device_reference() {
        let params = EntitiesQuery {
            attrs: Some("snowHeight".to_string()),
            q: Some("refDevice==\"urn:ngsi-ld:Device:mydevice\"".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.device(), Some("urn:ngsi-ld:Device:mydevice"));
    }

    #[test]
    fn ignores_other_predicates() {
        let params = EntitiesQuery {
            q: Some("snowHeight>10".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.device(), None);
    }

    #[test]
    fn ignores_unterminated_device_reference() {
        let params = EntitiesQuery {
            q: Some("refDevice==\"urn:ngsi-ld:Device:mydevice".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.device(), None);
    }

    #[test]
    fn splits_types_and_attributes() {
        let params = EntitiesQuery {
            entity_type: Some("Device,Beach".to_string()),
            attrs: Some("snowHeight".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.entity_types(), ["Device", "Beach"]);
        assert_eq!(query.entity_attributes(), ["snowHeight"]);
    }

    #[test]
    fn missing_lists_mean_unrestricted() {
        let query = Query::from_parameters(&empty_params(), request()).unwrap();
        assert_eq!(query.entity_types(), [""]);
        assert_eq!(query.entity_attributes(), [""]);
    }

    #[test]
    fn unparseable_limits_default_to_zero() {
        let params = EntitiesQuery {
            limit: Some("many".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.limit(), 0);
    }

    #[test]
    fn parses_the_limit() {
        let params = EntitiesQuery {
            limit: Some("4".to_string()),
            ..empty_params()
        };

        let query = Query::from_parameters(&params, request()).unwrap();
        assert_eq!(query.limit(), 4);
    }

    #[test]
    fn bad_geo_parameters_fail() {
        let params = EntitiesQuery {
            georel: Some("overlaps".to_string()),
            ..empty_params()
        };

        assert!(Query::from_parameters(&params, request()).is_err());
    }
}
