//! Cluster name validation.

use crate::error::ClusterError;

const MAX_NAME_LEN: usize = 63;

/// Names follow the DNS-label rules the provisioner enforces downstream:
/// lowercase alphanumerics and dashes, alphanumeric at both ends, at most 63
/// characters.
pub fn validate_name(name: &str) -> Result<(), ClusterError> {
    let invalid = |reason: &str| ClusterError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name exceeds 63 characters"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            "only lowercase letters, digits, and dashes are allowed",
        ));
    }
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if first == b'-' || last == b'-' {
        return Err(invalid("name must start and end with a letter or digit"));
    }
    Ok(())
}
