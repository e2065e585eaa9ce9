use crate::error::{Error, Result};

/// Validate that a member id is usable as a name in logs, keys and requests.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(Error::validation(format!(
            "member id '{name}' must be 1-128 characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(Error::validation(format!(
            "member id '{name}' contains invalid characters (only alphanumeric, dash, underscore, dot allowed)"
        )));
    }
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
