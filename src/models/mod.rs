pub mod requests;
pub mod responses;

pub use requests::{ContextSourceRegistration, EntitiesQuery, EntityInfo, RegistrationInfo};
pub use responses::{HealthPayload, RegisteredSource};
