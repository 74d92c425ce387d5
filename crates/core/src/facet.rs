//! Facet attachments and their relational form.
//!
//! A facet is a named, opaque JSON payload hung off a fingerprint by some
//! plugin of the host. Storage flattens every facet into a
//! [`FacetEntry`] (one serialized entry per row). When the entries have to be
//! viewed as one structured document again, they are grouped by name into
//! arrays, so several facets of the same kind survive side by side:
//!
//! ```json
//! { "TestFacet": [{"property": "a"}, {"property": "b"}], "Other": [{}] }
//! ```

use crate::Fingerprint;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A facet attached to a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    /// The facet's type name.
    pub name: String,
    pub payload: Value,
    /// Whether this facet keeps the fingerprint from being garbage collected.
    pub deletion_blocked: bool,
}

impl Facet {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload, deletion_blocked: false }
    }

    pub fn blocking_deletion(mut self) -> Self {
        self.deletion_blocked = true;
        self
    }
}

/// The flattened, serialized form of one [`Facet`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FacetEntry {
    pub name: String,
    /// The payload as a JSON document.
    pub entry: String,
    pub deletion_blocked: bool,
}

impl TryFrom<&Facet> for FacetEntry {
    type Error = crate::error::Error;
    fn try_from(facet: &Facet) -> Result<Self> {
        Ok(Self {
            name: facet.name.clone(),
            entry: serde_json::to_string(&facet.payload).or_raise(|| ErrorKind::InvalidFacet(facet.name.clone()))?,
            deletion_blocked: facet.deletion_blocked,
        })
    }
}

impl TryFrom<&FacetEntry> for Facet {
    type Error = crate::error::Error;
    fn try_from(entry: &FacetEntry) -> Result<Self> {
        Ok(Self {
            name: entry.name.clone(),
            payload: parse_entry(entry)?,
            deletion_blocked: entry.deletion_blocked,
        })
    }
}

fn parse_entry(entry: &FacetEntry) -> Result<Value> {
    if entry.name.is_empty() {
        exn::bail!(ErrorKind::InvalidFacet(entry.name.clone()));
    }
    serde_json::from_str(&entry.entry).or_raise(|| ErrorKind::InvalidFacet(entry.name.clone()))
}

/// Flatten the facets of a fingerprint, in insertion order.
pub fn extract_facets(fingerprint: &Fingerprint) -> Result<Vec<FacetEntry>> {
    fingerprint.facets.iter().map(FacetEntry::try_from).collect()
}

/// Rebuild facets from their flattened entries, preserving order.
pub fn decode_facets(entries: &[FacetEntry]) -> Result<Vec<Facet>> {
    entries.iter().map(Facet::try_from).collect()
}

/// Group entries into a `{ name: [entry, ...] }` document.
///
/// Names appear in order of first occurrence and entries keep row order.
pub fn build_facet_document(entries: &[FacetEntry]) -> Result<Value> {
    let mut document = Map::new();
    for entry in entries {
        let payload = parse_entry(entry)?;
        if let Value::Array(list) = document.entry(entry.name.clone()).or_insert_with(|| Value::Array(Vec::new())) {
            list.push(payload);
        }
    }
    Ok(Value::Object(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FingerprintHash;
    use serde_json::json;

    fn entry(name: &str, entry: &str) -> FacetEntry {
        FacetEntry { name: name.to_string(), entry: entry.to_string(), deletion_blocked: false }
    }

    #[test]
    fn test_extract_facets_keeps_insertion_order() {
        let hash: FingerprintHash = "0123456789abcdef0123456789abcdef".parse().unwrap();
        let mut fingerprint = Fingerprint::new(hash, "foo.jar", None);
        fingerprint.add_facet(Facet::new("TestFacet", json!({"property": "a", "timestamp": 3})));
        fingerprint.add_facet(Facet::new("Other", json!([1, 2])).blocking_deletion());
        fingerprint.add_facet(Facet::new("TestFacet", json!({"property": "b", "timestamp": 4})));

        let entries = extract_facets(&fingerprint).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], entry("TestFacet", r#"{"property":"a","timestamp":3}"#));
        assert_eq!(entries[1].name, "Other");
        assert!(entries[1].deletion_blocked);
        assert_eq!(entries[2].entry, r#"{"property":"b","timestamp":4}"#);

        assert_eq!(decode_facets(&entries).unwrap(), fingerprint.facets);
    }

    #[test]
    fn test_document_groups_entries_by_name() {
        let entries = vec![
            entry("Zeta", r#"{"n":1}"#),
            entry("Alpha", r#""plain""#),
            entry("Zeta", r#"{"n":2}"#),
        ];
        let document = build_facet_document(&entries).unwrap();
        assert_eq!(document, json!({"Zeta": [{"n": 1}, {"n": 2}], "Alpha": ["plain"]}));
        let names: Vec<_> = document.as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, ["Zeta", "Alpha"]);
    }

    #[test]
    fn test_empty_entries_produce_empty_document() {
        assert_eq!(build_facet_document(&[]).unwrap(), json!({}));
    }

    #[test]
    fn test_malformed_entry_is_rejected() {
        let entries = vec![entry("Good", "{}"), entry("Broken", "{not json")];
        let err = decode_facets(&entries).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidFacet("Broken".to_string()));
        let err = build_facet_document(&entries).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidFacet("Broken".to_string()));
    }

    #[test]
    fn test_nameless_entry_is_rejected() {
        let err = decode_facets(&[entry("", "{}")]).unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidFacet(_)));
    }
}
