//! Projection of an upstream user-info document onto OIDC claim names.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

const NESTED_SEPARATOR: &str = "::";
const DOTTED_SEPARATOR: char = '.';

/// Resolves `path` against a nested JSON object.
///
/// Segments are split on `::` when the path contains it, otherwise on `.`. Every segment but
/// the last must land on an object; anything else resolves to `None`.
pub fn resolve_path<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.contains(NESTED_SEPARATOR) {
        walk(document, path.split(NESTED_SEPARATOR))
    } else if path.contains(DOTTED_SEPARATOR) {
        walk(document, path.split(DOTTED_SEPARATOR))
    } else {
        document.get(path)
    }
}

fn walk<'a, 'p>(
    document: &'a Map<String, Value>,
    mut segments: impl Iterator<Item = &'p str>,
) -> Option<&'a Value> {
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Renames attributes per `mapping` (upstream path -> claim name) and passes everything else
/// through.
///
/// A top-level key that appears verbatim in `mapping` is never copied under its original name.
/// The mapping table is a `BTreeMap`, so when two paths target the same claim the later path in
/// sort order wins, identically on every call.
pub fn map_claims(document: &Map<String, Value>, mapping: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut claims = Map::new();

    for (upstream_path, claim_name) in mapping {
        if let Some(value) = resolve_path(document, upstream_path) {
            claims.insert(claim_name.clone(), value.clone());
        }
    }

    for (key, value) in document {
        if !mapping.contains_key(key) {
            claims.insert(key.clone(), value.clone());
        }
    }

    claims
}
