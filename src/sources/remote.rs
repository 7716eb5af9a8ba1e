use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use url::Url;
use uuid::Uuid;

use crate::geojson;
use crate::models::RegisteredSource;
use crate::query::Query;
use crate::request::ProxiedRequest;

use super::{CompiledRegistration, ContextSource, Entity, EntityCallback, SourceError};

/// How the broker identifies itself to upstream context sources.
const BROKER_USER_AGENT: &str = concat!("ngsild-broker/", env!("CARGO_PKG_VERSION"));

/// A context source reached by reverse-proxying the caller's request to the
/// endpoint advertised in its registration.
pub struct RemoteContextSource {
    id: String,
    registration: CompiledRegistration,
    client: Client,
}

impl RemoteContextSource {
    pub fn new(registration: CompiledRegistration, client: Client) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registration,
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stored registration extended with the broker-assigned id, as
    /// echoed back to the registrant.
    pub fn describe(&self) -> RegisteredSource {
        RegisteredSource {
            id: self.id.clone(),
            registration: self.registration.registration().clone(),
        }
    }

    /// Forward the buffered request to the registration endpoint and capture
    /// status, content type and body in memory.
    ///
    /// The original `Host` moves to `X-Forwarded-Host` and `User-Agent` is
    /// rewritten to the broker identity. For GET-style calls
    /// `Accept-Encoding` is stripped so the upstream cannot reply with a
    /// compressed body.
    async fn proxy(
        &self,
        request: &ProxiedRequest,
        strip_accept_encoding: bool,
    ) -> Result<RemoteResponse, SourceError> {
        let endpoint = Url::parse(self.registration.endpoint()).map_err(|e| {
            SourceError::Transport(format!(
                "invalid endpoint {}: {}",
                self.registration.endpoint(),
                e
            ))
        })?;

        let mut target = endpoint.clone();
        target.set_path(&join_paths(endpoint.path(), request.path()));
        target.set_query(match request.query() {
            "" => None,
            query => Some(query),
        });

        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let mut forwarded_host = None;
        for (name, value) in request.headers() {
            if name.eq_ignore_ascii_case("host") {
                forwarded_host = Some(value.clone());
                continue;
            }
            if name.eq_ignore_ascii_case("user-agent")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            if strip_accept_encoding && name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        if let Some(host) = forwarded_host {
            if let Ok(value) = HeaderValue::from_str(&host) {
                headers.insert(HeaderName::from_static("x-forwarded-host"), value);
            }
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(BROKER_USER_AGENT));

        let mut builder = self.client.request(method, target).headers(headers);
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?;

        if status >= 400 {
            return Err(SourceError::Upstream {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(RemoteResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl ContextSource for RemoteContextSource {
    fn provides_attribute(&self, attribute_name: &str) -> bool {
        self.registration.provides_attribute(attribute_name)
    }

    fn provides_entities_with_matching_id(&self, entity_id: &str) -> bool {
        self.registration.provides_entities_with_matching_id(entity_id)
    }

    fn provides_type(&self, type_name: &str) -> bool {
        self.registration.provides_type(type_name)
    }

    async fn create_entity(
        &self,
        _type_name: &str,
        _entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<(), SourceError> {
        self.proxy(request, false).await.map(|_| ())
    }

    async fn get_entities(
        &self,
        query: &Query,
        callback: EntityCallback<'_>,
    ) -> Result<(), SourceError> {
        let response = self.proxy(query.request(), true).await?;
        if response.status != 200 {
            return Ok(());
        }

        if response.matches_content_type(geojson::CONTENT_TYPE) {
            geojson::unpack_feature_collection(&response.body, &mut |feature| callback(feature))
        } else {
            let entities: Vec<Entity> = serde_json::from_slice(&response.body)?;
            for entity in entities {
                callback(entity)?;
            }
            Ok(())
        }
    }

    async fn update_entity_attributes(
        &self,
        _entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<(), SourceError> {
        self.proxy(request, false).await.map(|_| ())
    }

    async fn retrieve_entity(
        &self,
        _entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<Entity, SourceError> {
        let response = self.proxy(request, true).await?;
        if response.status != 200 {
            return Err(SourceError::UnexpectedStatus(response.status));
        }

        Ok(serde_json::from_slice(&response.body)?)
    }
}

/// The buffered upstream response the proxy decides over.
struct RemoteResponse {
    status: u16,
    content_type: String,
    body: Bytes,
}

impl RemoteResponse {
    fn matches_content_type(&self, prefix: &str) -> bool {
        self.content_type.starts_with(prefix)
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextSourceRegistration, EntitiesQuery};
    use actix_web::test::TestRequest;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registration(endpoint: &str) -> CompiledRegistration {
        let registration: ContextSourceRegistration = serde_json::from_value(json!({
            "type": "ContextSourceRegistration",
            "endpoint": endpoint,
            "information": [{
                "entities": [{ "type": "Device", "idPattern": "^urn:ngsi-ld:Device:.+" }],
                "properties": ["snowHeight"]
            }]
        }))
        .unwrap();
        CompiledRegistration::new(registration).unwrap()
    }

    fn remote_source(endpoint: &str) -> RemoteContextSource {
        RemoteContextSource::new(registration(endpoint), Client::new())
    }

    fn entities_query(uri: &str) -> Query {
        let req = TestRequest::get()
            .uri(uri)
            .insert_header(("Host", "broker.local"))
            .insert_header(("Accept-Encoding", "gzip"))
            .to_http_request();
        let params = actix_web::web::Query::<EntitiesQuery>::from_query(req.query_string())
            .unwrap()
            .into_inner();
        Query::from_parameters(&params, ProxiedRequest::from_parts(&req, Bytes::new())).unwrap()
    }

    async fn collect_entities(source: &RemoteContextSource, query: &Query) -> Vec<Value> {
        let mut entities = Vec::new();
        source
            .get_entities(query, &mut |entity| {
                entities.push(entity);
                Ok(())
            })
            .await
            .unwrap();
        entities
    }

    #[actix_web::test]
    async fn forwards_queries_and_decodes_json_arrays() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ngsi-ld/v1/entities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "urn:ngsi-ld:WeatherObserved:x", "type": "WeatherObserved" }
            ])))
            .mount(&server)
            .await;

        let source = remote_source(&server.uri());
        let query = entities_query("/ngsi-ld/v1/entities?type=WeatherObserved&attrs=snowHeight");
        let entities = collect_entities(&source, &query).await;

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0]["type"], "WeatherObserved");

        let received = &server.received_requests().await.unwrap()[0];
        assert_eq!(
            received.url.query().unwrap(),
            "type=WeatherObserved&attrs=snowHeight"
        );
        assert_eq!(
            received.headers.get("user-agent").unwrap().to_str().unwrap(),
            BROKER_USER_AGENT
        );
        assert_eq!(
            received
                .headers
                .get("x-forwarded-host")
                .unwrap()
                .to_str()
                .unwrap(),
            "broker.local"
        );
        assert!(received.headers.get("accept-encoding").is_none());
    }

    #[actix_web::test]
    async fn unpacks_geojson_query_responses() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [{
                "id": "urn:ngsi-ld:Beach:omaha",
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [8.0, 40.0] },
                "properties": { "type": "Beach" }
            }]
        });

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body.to_string(), "application/geo+json;charset=utf-8"),
            )
            .mount(&server)
            .await;

        let source = remote_source(&server.uri());
        let query = entities_query("/ngsi-ld/v1/entities?type=Beach");
        let entities = collect_entities(&source, &query).await;

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0]["type"], "Feature");
    }

    #[actix_web::test]
    async fn upstream_errors_carry_the_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let source = remote_source(&server.uri());
        let query = entities_query("/ngsi-ld/v1/entities?type=Device");
        let err = source
            .get_entities(&query, &mut |_| Ok(()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "upstream exploded");
    }

    #[actix_web::test]
    async fn empty_error_bodies_report_the_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let source = remote_source(&server.uri());
        let query = entities_query("/ngsi-ld/v1/entities?type=Device");
        let err = source
            .get_entities(&query, &mut |_| Ok(()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "received 502 response with empty body");
    }

    #[actix_web::test]
    async fn forwards_patches_with_path_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/ngsi-ld/v1/entities/urn:ngsi-ld:Device:x/attrs/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let body = Bytes::from_static(b"{\"value\":\"v\"}");
        let req = TestRequest::patch()
            .uri("/ngsi-ld/v1/entities/urn:ngsi-ld:Device:x/attrs/")
            .to_http_request();
        let request = ProxiedRequest::from_parts(&req, body.clone());

        let source = remote_source(&server.uri());
        source
            .update_entity_attributes("urn:ngsi-ld:Device:x", &request)
            .await
            .unwrap();

        let received = &server.received_requests().await.unwrap()[0];
        assert_eq!(received.body, body.to_vec());
    }

    #[actix_web::test]
    async fn retrieves_a_single_entity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ngsi-ld/v1/entities/urn:ngsi-ld:Device:livboj"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "urn:ngsi-ld:Device:livboj",
                "type": "Device"
            })))
            .mount(&server)
            .await;

        let req = TestRequest::get()
            .uri("/ngsi-ld/v1/entities/urn:ngsi-ld:Device:livboj")
            .to_http_request();
        let request = ProxiedRequest::from_parts(&req, Bytes::new());

        let source = remote_source(&server.uri());
        let entity = source
            .retrieve_entity("urn:ngsi-ld:Device:livboj", &request)
            .await
            .unwrap();

        assert_eq!(entity["id"], "urn:ngsi-ld:Device:livboj");
    }

    #[actix_web::test]
    async fn retrieve_rejects_unexpected_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let req = TestRequest::get()
            .uri("/ngsi-ld/v1/entities/urn:ngsi-ld:Device:livboj")
            .to_http_request();
        let request = ProxiedRequest::from_parts(&req, Bytes::new());

        let source = remote_source(&server.uri());
        let err = source
            .retrieve_entity("urn:ngsi-ld:Device:livboj", &request)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "unexpected response code 204 != 200");
    }

    #[test]
    fn capability_predicates_delegate_to_the_registration() {
        let source = remote_source("http://localhost:1234");

        assert!(source.provides_type("Device"));
        assert!(!source.provides_type("Beach"));
        assert!(source.provides_attribute("snowHeight"));
        assert!(!source.provides_attribute("temperature"));
        assert!(source.provides_entities_with_matching_id("urn:ngsi-ld:Device:mydevice"));
        assert!(!source.provides_entities_with_matching_id("urn:ngsi-ld:Beach:x"));
    }

    #[test]
    fn joins_endpoint_and_request_paths() {
        assert_eq!(join_paths("/", "/entities"), "/entities");
        assert_eq!(join_paths("/broker", "/entities"), "/broker/entities");
        assert_eq!(join_paths("/broker/", "/entities"), "/broker/entities");
    }
}
