//! Input validation for names and filesystem-facing identifiers
//!
//! Profile ids double as file names, so everything that becomes an id is
//! funneled through here.

use anyhow::{anyhow, Result};

/// Maximum length for names (profile names, device names)
pub const MAX_NAME_LENGTH: usize = 512;

/// Maximum length for resource ids (profile ids, device ids)
pub const MAX_ID_LENGTH: usize = 256;

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    if name.len() > MAX_NAME_LENGTH {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            MAX_NAME_LENGTH,
            name.len()
        ));
    }
    Ok(())
}

/// Validate a resource id that may end up in a filesystem path
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    if id.len() > MAX_ID_LENGTH {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes",
            field_name,
            MAX_ID_LENGTH
        ));
    }
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }
    Ok(())
}

/// Derive a filesystem-stable slug from a human name: lowercase ASCII
/// alphanumerics with single dashes between runs of anything else.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}
