//! Backend key layout.
//!
//! Every key the engine reads or writes is produced here, so the naming
//! rule is defined exactly once:
//!
//! | Key                              | Type   | Contents                                |
//! |----------------------------------|--------|-----------------------------------------|
//! | `bucket:<name>`                  | hash   | `creation_date`                         |
//! | `bucket:<name>:contents`         | set    | object keys in the bucket               |
//! | `object:<bucket>:<key>:metadata` | hash   | `content_type`, `size`, `creation_date` |
//! | `object:<bucket>:<key>:data`     | string | raw object bytes                        |
//!
//! Legal bucket names never contain `:` (see [`validate_bucket_name`]), so
//! the bucket segment of an object key is always unambiguous and no bucket
//! metadata key can be mistaken for a contents-index key.

use crate::errors::StoreError;

/// Prefix shared by bucket metadata and contents-index keys.
pub const BUCKET_PREFIX: &str = "bucket:";

/// Suffix appended to a bucket metadata key to form its contents index.
pub const CONTENTS_SUFFIX: &str = ":contents";

/// Prefix shared by object metadata and data keys.
pub const OBJECT_PREFIX: &str = "object:";

/// Hash field holding an RFC 3339 creation timestamp.
pub const FIELD_CREATION_DATE: &str = "creation_date";

/// Object metadata hash field holding the MIME type.
pub const FIELD_CONTENT_TYPE: &str = "content_type";

/// Object metadata hash field holding the payload length in bytes.
pub const FIELD_SIZE: &str = "size";

/// Names taken by fixed HTTP routes (`/health`, `/metrics`,
/// `/openapi.json`).  A bucket with one of these names could not be
/// addressed as `/{bucket}`.
pub const RESERVED_BUCKET_NAMES: &[&str] = &["health", "metrics", "openapi.json"];

/// `bucket:<name>`
pub fn bucket_key(bucket: &str) -> String {
    format!("{BUCKET_PREFIX}{bucket}")
}

/// `bucket:<name>:contents`
pub fn contents_key(bucket: &str) -> String {
    format!("{BUCKET_PREFIX}{bucket}{CONTENTS_SUFFIX}")
}

/// `object:<bucket>:<key>:metadata`
pub fn object_metadata_key(bucket: &str, key: &str) -> String {
    format!("{OBJECT_PREFIX}{bucket}:{key}:metadata")
}

/// `object:<bucket>:<key>:data`
pub fn object_data_key(bucket: &str, key: &str) -> String {
    format!("{OBJECT_PREFIX}{bucket}:{key}:data")
}

/// Glob pattern matching every bucket metadata key (and, unavoidably,
/// every contents-index key).
pub fn bucket_scan_pattern() -> String {
    format!("{BUCKET_PREFIX}*")
}

/// Recover a bucket name from an enumerated backend key.
///
/// Returns `None` for contents-index keys and for anything that could not
/// have been produced by [`bucket_key`] for a legal bucket name.
pub fn bucket_name_from_key(key: &str) -> Option<&str> {
    if key.ends_with(CONTENTS_SUFFIX) {
        return None;
    }
    let name = key.strip_prefix(BUCKET_PREFIX)?;
    if name.is_empty() || name.contains(':') {
        return None;
    }
    Some(name)
}

/// Validate a bucket name before it is first written to the backend.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and periods
/// - Must begin and end with a letter or number
/// - Cannot be formatted as an IP address (e.g., 192.168.5.4)
/// - Cannot be one of [`RESERVED_BUCKET_NAMES`]
pub fn validate_bucket_name(name: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidBucketName {
        name: name.to_string(),
    };

    if !(3..=63).contains(&name.len()) {
        return Err(invalid());
    }

    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '.')
    {
        return Err(invalid());
    }

    let alnum = |ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit();
    match (name.chars().next(), name.chars().last()) {
        (Some(first), Some(last)) if alnum(first) && alnum(last) => {}
        _ => return Err(invalid()),
    }

    if looks_like_ip(name) || RESERVED_BUCKET_NAMES.contains(&name) {
        return Err(invalid());
    }

    Ok(())
}

/// Check whether a string looks like an IPv4 address (e.g., "192.168.5.4").
fn looks_like_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| p.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(bucket_key("photos"), "bucket:photos");
        assert_eq!(contents_key("photos"), "bucket:photos:contents");
        assert_eq!(
            object_metadata_key("photos", "cat.png"),
            "object:photos:cat.png:metadata"
        );
        assert_eq!(
            object_data_key("photos", "cat.png"),
            "object:photos:cat.png:data"
        );
        assert_eq!(bucket_scan_pattern(), "bucket:*");
    }

    #[test]
    fn test_bucket_name_from_key() {
        assert_eq!(bucket_name_from_key("bucket:photos"), Some("photos"));
        assert_eq!(bucket_name_from_key("bucket:photos:contents"), None);
        assert_eq!(bucket_name_from_key("bucket:"), None);
        assert_eq!(bucket_name_from_key("object:photos:a:data"), None);
        assert_eq!(bucket_name_from_key("bucket:odd:name"), None);
    }

    #[test]
    fn test_inverse_mapping_roundtrips_for_legal_names() {
        for name in ["abc", "my.bucket", "a-b-c", "contents"] {
            validate_bucket_name(name).unwrap();
            assert_eq!(bucket_name_from_key(&bucket_key(name)), Some(name));
            assert_eq!(bucket_name_from_key(&contents_key(name)), None);
        }
    }

    #[test]
    fn test_object_keys_do_not_collide_across_buckets() {
        // "a:b" is not a legal bucket name, so "object:a:b:c:data" can only
        // mean bucket "a", key "b:c".
        assert!(validate_bucket_name("a:b").is_err());
        assert_ne!(object_data_key("abc", "x"), object_metadata_key("abc", "x"));
    }

    #[test]
    fn test_validate_bucket_name_valid() {
        assert!(validate_bucket_name("photos").is_ok());
        assert!(validate_bucket_name("my.bucket.name").is_ok());
        assert!(validate_bucket_name("123").is_ok());
    }

    #[test]
    fn test_validate_bucket_name_length() {
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_validate_bucket_name_bad_chars() {
        assert!(validate_bucket_name("Photos").is_err());
        assert!(validate_bucket_name("bucket_name").is_err());
        assert!(validate_bucket_name("bucket name").is_err());
        assert!(validate_bucket_name("photos:contents").is_err());
    }

    #[test]
    fn test_validate_bucket_name_bad_start_end() {
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket.").is_err());
    }

    #[test]
    fn test_validate_bucket_name_reserved() {
        for name in RESERVED_BUCKET_NAMES {
            assert!(validate_bucket_name(name).is_err(), "{name}");
        }
        assert!(validate_bucket_name("healthy").is_ok());
        assert!(validate_bucket_name("my-metrics").is_ok());
    }

    #[test]
    fn test_validate_bucket_name_ip_address() {
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name("999.999.999.999").is_ok());
    }
}
