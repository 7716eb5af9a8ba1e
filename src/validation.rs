use regex::Regex;
use url::Url;
use validator::ValidationError;

use crate::errors::AppError;

pub fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(endpoint).map_err(|_| ValidationError::new("endpoint"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ValidationError::new("endpoint"));
    }
    Ok(())
}

/// Compile an `idPattern` regular expression. Compilation happens once, at
/// registration time; a malformed pattern rejects the registration as a whole.
pub fn compile_id_pattern(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern).map_err(|e| {
        AppError::BadRequestData(format!("invalid idPattern \"{}\": {}", pattern, e))
    })
}
