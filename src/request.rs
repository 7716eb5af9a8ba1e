use actix_web::HttpRequest;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// A buffered copy of an inbound request.
///
/// Request bodies can only be read once, so the dispatcher extracts the body
/// into [`Bytes`] up front and keeps the parts needed later: the same buffer
/// serves both the routing decode (`id`/`type` sniffing) and the reverse-proxy
/// forward to a context source.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    method: String,
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl ProxiedRequest {
    pub fn from_parts(req: &HttpRequest, body: Bytes) -> Self {
        let headers = req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            method: req.method().as_str().to_string(),
            path: req.path().to_string(),
            query: req.query_string().to_string(),
            headers,
            body,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
