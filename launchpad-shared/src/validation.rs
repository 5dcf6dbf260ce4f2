/// Field-level validation helpers
///
/// Structural rules (required fields, email shape, password confirmation,
/// role and status domains) are declared with the `validator` derive on each
/// request type. Uniqueness is a separate, explicit phase: repositories call
/// `unique_email` / `unique_name` after the structural pass and before they
/// insert, so no validator ever performs hidden I/O.
///
/// # Example
///
/// ```
/// use launchpad_shared::validation::{parse_id, validate};
/// use launchpad_shared::models::user::CreateUser;
///
/// let request = CreateUser {
///     name: "Lee".to_string(),
///     email: "not-an-email".to_string(),
///     password: "pw!Fr0nt1er".to_string(),
///     password_confirm: "pw!Fr0nt1er".to_string(),
///     timezone: None,
/// };
/// assert!(validate(&request).is_err());
/// assert!(parse_id("nope").is_err());
/// ```

use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::error::{Error, FieldError, Result};

/// Flattens `validator` errors into field errors, sorted by field name
///
/// When `prefix` is given, every field name is reported as `prefix.field`.
pub fn field_errors(errors: &ValidationErrors, prefix: Option<&str>) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let name = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, field),
                    None => field.to_string(),
                };
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is not valid", field));
                FieldError { name, message }
            })
        })
        .collect();

    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

/// Runs the structural validation of `value`
pub fn validate<T: Validate>(value: &T) -> Result<()> {
    value.validate().map_err(Error::from)
}

/// Runs the structural validation of `value`, reporting fields under `prefix`
pub fn validate_prefixed<T: Validate>(value: &T, prefix: &str) -> Vec<FieldError> {
    match value.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => field_errors(&errors, Some(prefix)),
    }
}

/// Parses an identifier supplied by a caller
///
/// # Errors
///
/// Returns `Error::InvalidId` if `raw` is not a UUID
pub fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::InvalidId(raw.to_string()))
}

/// Canonical form of an email address: trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
