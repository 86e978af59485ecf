//! Resource and node naming rules of the control plane

use crate::error::{Error, Result};

/// Minimum length of a resource name
pub const RESOURCE_NAME_MIN_LEN: usize = 2;

/// Maximum length of a resource name
pub const RESOURCE_NAME_MAX_LEN: usize = 48;

/// Maximum length of a node name (DNS host name)
pub const NODE_NAME_MAX_LEN: usize = 253;

/// Prefix added to names that do not start with a letter
pub const NAME_PREFIX: &str = "LS_";

/// Names the control plane reserves for its own selectors
const RESERVED_KEYWORDS: &[&str] = &["all", "auto", "default", "none"];

fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Check a resource (volume) name against the control plane's rules
pub fn validate_resource_name(name: &str) -> Result<()> {
    const KIND: &str = "resource";

    if !name.is_ascii() {
        return Err(invalid(KIND, name, "contains non-ASCII characters"));
    }
    if name.len() < RESOURCE_NAME_MIN_LEN {
        return Err(invalid(
            KIND,
            name,
            format!("shorter than {} characters", RESOURCE_NAME_MIN_LEN),
        ));
    }
    if name.len() > RESOURCE_NAME_MAX_LEN {
        return Err(invalid(
            KIND,
            name,
            format!("longer than {} characters", RESOURCE_NAME_MAX_LEN),
        ));
    }
    if RESERVED_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(name))
    {
        return Err(invalid(KIND, name, "reserved keyword"));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(invalid(KIND, name, "must start with a letter or '_'"));
        }
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(invalid(KIND, name, format!("invalid character '{}'", c)));
    }
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(KIND, name, "must contain a letter or digit"));
    }

    Ok(())
}

/// Turn an arbitrary volume name into a valid resource name
///
/// Invalid characters become `_`, and names not starting with a letter get
/// the [`NAME_PREFIX`]. Fails if the result is still invalid (e.g. too long).
pub fn linstorify_resource_name(name: &str) -> Result<String> {
    let mut mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !mapped.starts_with(|c: char| c.is_ascii_alphabetic()) {
        mapped.insert_str(0, NAME_PREFIX);
    }

    validate_resource_name(&mapped)?;
    Ok(mapped)
}

/// Check a node name: a host name of letters, digits, `-`, `_` and `.`
pub fn validate_node_name(name: &str) -> Result<()> {
    const KIND: &str = "node";

    if name.is_empty() {
        return Err(invalid(KIND, name, "empty"));
    }
    if name.len() > NODE_NAME_MAX_LEN {
        return Err(invalid(
            KIND,
            name,
            format!("longer than {} characters", NODE_NAME_MAX_LEN),
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid(KIND, name, "must start with a letter or digit"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(KIND, name, format!("invalid character '{}'", c)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOO_LONG: &str = "abcdefghijklmnopqrstuvwyzABCDEFGHIJKLMNOPQRSTUVWXYZ_______";

    #[test]
    fn test_valid_resource_name() {
        assert!(validate_resource_name("rck23").is_ok());
        assert!(validate_resource_name("pvc-1be00fd3").is_ok());
        assert!(validate_resource_name("_a").is_ok());
    }

    #[test]
    fn test_invalid_resource_names() {
        assert!(validate_resource_name("all").is_err());
        assert!(validate_resource_name("AUTO").is_err());
        assert!(validate_resource_name(TOO_LONG).is_err());
        assert!(validate_resource_name("hello🐱kitty").is_err());
        assert!(validate_resource_name("_-").is_err());
        assert!(validate_resource_name("a").is_err());
        assert!(validate_resource_name("1abc").is_err());
        assert!(validate_resource_name("a.b").is_err());
    }

    #[test]
    fn test_linstorify_resource_name() {
        let cases = [
            ("rck23", "rck23"),
            ("hello🐱kitty", "hello_kitty"),
            (
                "1be00fd3-d435-436f-be20-561418c62762",
                "LS_1be00fd3-d435-436f-be20-561418c62762",
            ),
            (
                "b1e00fd3-d435-436f-be20-561418c62762",
                "b1e00fd3-d435-436f-be20-561418c62762",
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(linstorify_resource_name(input).unwrap(), expected, "input {}", input);
        }

        assert!(linstorify_resource_name(TOO_LONG).is_err());
    }

    #[test]
    fn test_node_names() {
        assert!(validate_node_name("node-3").is_ok());
        assert!(validate_node_name("worker-1.cluster.local").is_ok());
        assert!(validate_node_name("").is_err());
        assert!(validate_node_name("-node").is_err());
        assert!(validate_node_name("node 3").is_err());
    }
}
