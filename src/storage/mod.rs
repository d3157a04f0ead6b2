pub mod backends;
pub mod template;

pub use template::{ObjectSummary, StorageBackend};

/// The longest key accepted by any backend.
const MAX_KEY_LEN: usize = 1024;

/// Rejects keys which could escape their bucket.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("key is empty".to_string());
    }

    if key.len() > MAX_KEY_LEN {
        return Err(format!("key is too long (max {})", MAX_KEY_LEN));
    }

    if key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return Err("key contains a disallowed path segment".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_keys() {
        assert!(validate_key("cat.png").is_ok());
        assert!(validate_key("2024/01/cat 1.jpeg").is_ok());
        assert!(validate_key("resized-cat.png").is_ok());
    }

    #[test]
    fn rejects_traversal() {
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/../../b.png").is_err());
        assert!(validate_key("/abs.png").is_err());
        assert!(validate_key("a\\b.png").is_err());
        assert!(validate_key(&"a".repeat(2000)).is_err());
    }
}
