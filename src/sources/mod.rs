use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::errors::AppError;
use crate::models::ContextSourceRegistration;
use crate::query::Query;
use crate::request::ProxiedRequest;

pub mod remote;

pub use remote::RemoteContextSource;

/// A context entity is opaque JSON to the broker.
pub type Entity = Value;

pub type SharedContextSource = Arc<dyn ContextSource>;

/// Receives the entities a queried context source produces, one at a time.
pub type EntityCallback<'a> = &'a mut (dyn FnMut(Entity) -> Result<(), SourceError> + Send);

/// A context source provides create, query, retrieve and update support for
/// some set of entities, advertised through its registration.
#[async_trait]
pub trait ContextSource: Send + Sync {
    fn provides_attribute(&self, attribute_name: &str) -> bool;
    fn provides_entities_with_matching_id(&self, entity_id: &str) -> bool;
    fn provides_type(&self, type_name: &str) -> bool;

    async fn create_entity(
        &self,
        type_name: &str,
        entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<(), SourceError>;

    async fn get_entities(
        &self,
        query: &Query,
        callback: EntityCallback<'_>,
    ) -> Result<(), SourceError>;

    async fn update_entity_attributes(
        &self,
        entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<(), SourceError>;

    async fn retrieve_entity(
        &self,
        entity_id: &str,
        request: &ProxiedRequest,
    ) -> Result<Entity, SourceError>;
}

#[derive(Debug)]
pub enum SourceError {
    Transport(String),
    Upstream { status: u16, body: String },
    UnexpectedStatus(u16),
    Decode(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "{}", msg),
            SourceError::Upstream { status, body } => {
                if body.is_empty() {
                    write!(f, "received {} response with empty body", status)
                } else {
                    write!(f, "{}", body)
                }
            }
            SourceError::UnexpectedStatus(status) => {
                write!(f, "unexpected response code {} != 200", status)
            }
            SourceError::Decode(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

/// A registration with every `idPattern` compiled up front.
///
/// Construction fails on a malformed pattern, so a bad registration never
/// reaches the registry. The capability predicates answer the registry's
/// routing questions.
#[derive(Debug, Clone)]
pub struct CompiledRegistration {
    registration: ContextSourceRegistration,
    id_patterns: Vec<Regex>,
}

impl CompiledRegistration {
    pub fn new(registration: ContextSourceRegistration) -> Result<Self, AppError> {
        let mut id_patterns = Vec::new();
        for info in &registration.information {
            for entity in &info.entities {
                if let Some(pattern) = &entity.id_pattern {
                    id_patterns.push(crate::validation::compile_id_pattern(pattern)?);
                }
            }
        }

        Ok(Self {
            registration,
            id_patterns,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.registration.endpoint
    }

    pub fn registration(&self) -> &ContextSourceRegistration {
        &self.registration
    }

    pub fn provides_attribute(&self, attribute_name: &str) -> bool {
        self.registration
            .information
            .iter()
            .any(|info| info.properties.iter().any(|p| p == attribute_name))
    }

    /// Sources that registered without any `idPattern` never match by id.
    pub fn provides_entities_with_matching_id(&self, entity_id: &str) -> bool {
        self.id_patterns.iter().any(|p| p.is_match(entity_id))
    }

    pub fn provides_type(&self, type_name: &str) -> bool {
        self.registration.information.iter().any(|info| {
            info.entities
                .iter()
                .any(|entity| entity.entity_type == type_name)
        })
    }
}
