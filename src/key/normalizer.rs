//! Key Normalizer Module
//!
//! Canonicalizes hierarchical cache keys so that numeric and string
//! encodings of the same id collapse to a single stable form. The canonical
//! string is the hash input used throughout the engine: the key-type tag is
//! part of it, and composite location order is significant and never
//! reordered.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Constants ==
/// Maximum traversal depth accepted when parsing a raw key structure.
///
/// Cyclic or degenerately nested inputs fail deterministically with
/// [`CacheError::MalformedKey`] instead of looping or overflowing the stack.
pub const MAX_KEY_DEPTH: usize = 32;

// == Key Part ==
/// A single id field of a key: either a numeric or a textual encoding.
///
/// Both encodings of the same logical value canonicalize identically:
/// `KeyPart::Int(42)` and `KeyPart::Str("42")` produce the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum KeyPart {
    /// Numeric id
    Int(i64),
    /// Textual id
    Str(String),
}

impl KeyPart {
    /// Returns the canonical textual form of this id.
    ///
    /// A string that is itself a canonical integer rendering ("42", "-7")
    /// collapses to the numeric form. Non-canonical renderings such as
    /// "007" stay textual: they are a different encoding, not a different
    /// spelling of the same integer.
    pub fn canonical(&self) -> String {
        match self {
            KeyPart::Int(n) => n.to_string(),
            KeyPart::Str(s) => match s.parse::<i64>() {
                Ok(n) if n.to_string() == *s => n.to_string(),
                _ => s.clone(),
            },
        }
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

// == Location Ref ==
/// One element of a composite key's enclosing location chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocationRef {
    /// Location type tag (e.g. "customer", "region")
    pub location_type: String,
    /// Location id
    pub location_id: KeyPart,
}

impl LocationRef {
    /// Creates a new location reference.
    pub fn new(location_type: impl Into<String>, location_id: impl Into<KeyPart>) -> Self {
        Self {
            location_type: location_type.into(),
            location_id: location_id.into(),
        }
    }

    /// Canonical `type:id` form with separators escaped.
    fn canonical(&self) -> String {
        format!(
            "{}:{}",
            escape(&self.location_type),
            escape(&self.location_id.canonical())
        )
    }
}

// == Cache Key ==
/// A hierarchical cache key.
///
/// `Primary` addresses a top-level entity; `Composite` addresses an entity
/// nested under an ordered chain of enclosing locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum CacheKey {
    /// Top-level entity key
    Primary {
        /// Entity type tag
        entity: String,
        /// Entity id
        id: KeyPart,
    },
    /// Entity key scoped under an ordered location chain
    Composite {
        /// Entity type tag
        entity: String,
        /// Entity id
        id: KeyPart,
        /// Enclosing locations, outermost first. Order is significant.
        locations: Vec<LocationRef>,
    },
}

impl CacheKey {
    /// Creates a primary key.
    pub fn primary(entity: impl Into<String>, id: impl Into<KeyPart>) -> Self {
        CacheKey::Primary {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a composite key with the given location chain.
    pub fn composite(
        entity: impl Into<String>,
        id: impl Into<KeyPart>,
        locations: Vec<LocationRef>,
    ) -> Self {
        CacheKey::Composite {
            entity: entity.into(),
            id: id.into(),
            locations,
        }
    }

    /// Returns the location chain (empty for primary keys).
    pub fn locations(&self) -> &[LocationRef] {
        match self {
            CacheKey::Primary { .. } => &[],
            CacheKey::Composite { locations, .. } => locations,
        }
    }

    /// Returns true for primary (location-less) keys.
    pub fn is_primary(&self) -> bool {
        matches!(self, CacheKey::Primary { .. })
    }
}

// == Key Normalizer ==
/// Canonicalization entry points.
///
/// Two keys address the same logical entity iff their canonical forms are
/// byte-equal; the canonical form is the map key used by every store layer.
pub struct KeyNormalizer;

impl KeyNormalizer {
    /// Canonicalizes a structured key to its stable string form.
    ///
    /// The key-type tag (`p` / `c`) is part of the output, so a composite
    /// key with an empty location chain never collides with a primary key.
    pub fn normalize(key: &CacheKey) -> String {
        match key {
            CacheKey::Primary { entity, id } => {
                format!("p:{}:{}", escape(entity), escape(&id.canonical()))
            }
            CacheKey::Composite {
                entity,
                id,
                locations,
            } => {
                let mut out = format!("c:{}:{}", escape(entity), escape(&id.canonical()));
                for loc in locations {
                    out.push('|');
                    out.push_str(&loc.canonical());
                }
                out
            }
        }
    }

    /// Parses and canonicalizes a raw JSON key structure.
    ///
    /// Accepted shape: `{"type": "...", "pk": <number|string>,
    /// "loc": [{"type": "...", "lk": <number|string>}, ...]}` with `loc`
    /// optional. Structurally invalid input is rejected with
    /// [`CacheError::MalformedKey`] before it can reach any store.
    pub fn normalize_value(raw: &Value) -> Result<CacheKey> {
        check_depth(raw, 0)?;

        let obj = raw
            .as_object()
            .ok_or_else(|| CacheError::MalformedKey("key must be an object".to_string()))?;

        let entity = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CacheError::MalformedKey("key is missing a type tag".to_string()))?;

        let id = parse_id(obj.get("pk").ok_or_else(|| {
            CacheError::MalformedKey("key is missing a primary id".to_string())
        })?)?;

        match obj.get("loc") {
            None | Some(Value::Null) => Ok(CacheKey::primary(entity, id)),
            Some(Value::Array(entries)) => {
                let mut locations = Vec::with_capacity(entries.len());
                for entry in entries {
                    let loc = entry.as_object().ok_or_else(|| {
                        CacheError::MalformedKey("location entry must be an object".to_string())
                    })?;
                    let location_type = loc.get("type").and_then(Value::as_str).ok_or_else(|| {
                        CacheError::MalformedKey("location entry is missing a type".to_string())
                    })?;
                    let location_id = parse_id(loc.get("lk").ok_or_else(|| {
                        CacheError::MalformedKey("location entry is missing an id".to_string())
                    })?)?;
                    locations.push(LocationRef::new(location_type, location_id));
                }
                Ok(CacheKey::composite(entity, id, locations))
            }
            Some(_) => Err(CacheError::MalformedKey(
                "location chain must be an array".to_string(),
            )),
        }
    }
}

// == Location Filter Matching ==
/// Prefix-matches a location filter against a key's location chain.
///
/// A non-empty filter matches iff it equals the chain element-wise over its
/// full length after normalization. An empty filter matches only keys with
/// no locations at all.
pub fn matches_location_filter(filter: &[LocationRef], locations: &[LocationRef]) -> bool {
    if filter.is_empty() {
        return locations.is_empty();
    }
    if filter.len() > locations.len() {
        return false;
    }
    filter
        .iter()
        .zip(locations.iter())
        .all(|(f, l)| f.canonical() == l.canonical())
}

// == Parsing Helpers ==
/// Parses an id field into a [`KeyPart`].
fn parse_id(value: &Value) -> Result<KeyPart> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(KeyPart::Int(i))
            } else {
                Err(CacheError::MalformedKey(format!(
                    "id must be an integer or string, got {}",
                    n
                )))
            }
        }
        Value::String(s) => Ok(KeyPart::Str(s.clone())),
        other => Err(CacheError::MalformedKey(format!(
            "id must be an integer or string, got {}",
            type_name(other)
        ))),
    }
}

/// Rejects cyclic or degenerately nested structures before parsing.
fn check_depth(value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_KEY_DEPTH {
        return Err(CacheError::MalformedKey(
            "cyclic or excessively nested key structure".to_string(),
        ));
    }
    match value {
        Value::Array(items) => {
            for item in items {
                check_depth(item, depth + 1)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for item in map.values() {
                check_depth(item, depth + 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Escapes the canonical-form separators inside one segment.
fn escape(segment: &str) -> String {
    if !segment.contains(['\\', ':', '|']) {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len() + 2);
    for c in segment.chars() {
        if matches!(c, '\\' | ':' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_ids_normalize_equal() {
        let a = CacheKey::primary("user", 42);
        let b = CacheKey::primary("user", "42");

        assert_eq!(KeyNormalizer::normalize(&a), KeyNormalizer::normalize(&b));
    }

    #[test]
    fn test_non_canonical_numeric_string_stays_textual() {
        let padded = CacheKey::primary("user", "007");
        let plain = CacheKey::primary("user", 7);

        assert_ne!(
            KeyNormalizer::normalize(&padded),
            KeyNormalizer::normalize(&plain)
        );
    }

    #[test]
    fn test_key_type_tag_distinguishes_variants() {
        let primary = CacheKey::primary("user", 1);
        let composite = CacheKey::composite("user", 1, vec![]);

        assert_ne!(
            KeyNormalizer::normalize(&primary),
            KeyNormalizer::normalize(&composite)
        );
    }

    #[test]
    fn test_location_order_is_significant() {
        let a = CacheKey::composite(
            "order",
            1,
            vec![LocationRef::new("region", 1), LocationRef::new("site", 2)],
        );
        let b = CacheKey::composite(
            "order",
            1,
            vec![LocationRef::new("site", 2), LocationRef::new("region", 1)],
        );

        assert_ne!(KeyNormalizer::normalize(&a), KeyNormalizer::normalize(&b));
    }

    #[test]
    fn test_mixed_encoding_composite_keys_normalize_equal() {
        // The two raw forms differ only in numeric vs string id encodings.
        let a = json!({"type": "order", "pk": 42, "loc": [{"type": "customer", "lk": "7"}]});
        let b = json!({"type": "order", "pk": "42", "loc": [{"type": "customer", "lk": 7}]});

        let ka = KeyNormalizer::normalize_value(&a).unwrap();
        let kb = KeyNormalizer::normalize_value(&b).unwrap();

        assert_eq!(KeyNormalizer::normalize(&ka), KeyNormalizer::normalize(&kb));
    }

    #[test]
    fn test_normalize_value_primary() {
        let raw = json!({"type": "user", "pk": 1});
        let key = KeyNormalizer::normalize_value(&raw).unwrap();

        assert!(key.is_primary());
        assert_eq!(KeyNormalizer::normalize(&key), "p:user:1");
    }

    #[test]
    fn test_normalize_value_rejects_missing_id() {
        let raw = json!({"type": "user"});
        let result = KeyNormalizer::normalize_value(&raw);

        assert!(matches!(result, Err(CacheError::MalformedKey(_))));
    }

    #[test]
    fn test_normalize_value_rejects_bool_id() {
        let raw = json!({"type": "user", "pk": true});
        let result = KeyNormalizer::normalize_value(&raw);

        assert!(matches!(result, Err(CacheError::MalformedKey(_))));
    }

    #[test]
    fn test_normalize_value_rejects_excessive_nesting() {
        // Build a structure nested past the depth guard.
        let mut raw = json!({"type": "user", "pk": 1});
        for _ in 0..(MAX_KEY_DEPTH + 1) {
            raw = json!({ "type": "user", "pk": 1, "nested": raw });
        }

        let result = KeyNormalizer::normalize_value(&raw);
        assert!(matches!(result, Err(CacheError::MalformedKey(_))));
    }

    #[test]
    fn test_separator_in_string_id_does_not_collide() {
        let tricky = CacheKey::composite("a", "b|c:d", vec![]);
        let plain = CacheKey::composite("a", "b", vec![LocationRef::new("c", "d")]);

        assert_ne!(
            KeyNormalizer::normalize(&tricky),
            KeyNormalizer::normalize(&plain)
        );
    }

    #[test]
    fn test_empty_filter_matches_only_location_less_keys() {
        let filter: Vec<LocationRef> = vec![];

        assert!(matches_location_filter(&filter, &[]));
        assert!(!matches_location_filter(
            &filter,
            &[LocationRef::new("region", 1)]
        ));
    }

    #[test]
    fn test_filter_prefix_matches_longer_chain() {
        let filter = vec![LocationRef::new("region", 1)];
        let chain = vec![LocationRef::new("region", "1"), LocationRef::new("site", 2)];

        assert!(matches_location_filter(&filter, &chain));
    }

    #[test]
    fn test_filter_longer_than_chain_does_not_match() {
        let filter = vec![LocationRef::new("region", 1), LocationRef::new("site", 2)];
        let chain = vec![LocationRef::new("region", 1)];

        assert!(!matches_location_filter(&filter, &chain));
    }

    #[test]
    fn test_filter_mismatched_element_does_not_match() {
        let filter = vec![LocationRef::new("region", 2)];
        let chain = vec![LocationRef::new("region", 1), LocationRef::new("site", 2)];

        assert!(!matches_location_filter(&filter, &chain));
    }

    #[test]
    fn test_filter_normalizes_encodings_before_comparing() {
        let filter = vec![LocationRef::new("region", "7")];
        let chain = vec![LocationRef::new("region", 7)];

        assert!(matches_location_filter(&filter, &chain));
    }
}
