use serde::Serialize;
use utoipa::ToSchema;

use crate::models::requests::ContextSourceRegistration;

#[derive(Serialize, ToSchema)]
pub struct HealthPayload {
    pub status: String,
}

/// A stored registration echoed back to the registrant, extended with the
/// broker-assigned source id.
#[derive(Serialize, ToSchema)]
pub struct RegisteredSource {
    pub id: String,
    #[serde(flatten)]
    pub registration: ContextSourceRegistration,
}
