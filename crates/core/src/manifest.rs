//! Multi-document YAML parsing into `Entity` values, with size and node
//! budget guards.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::{Entity, ManifestLimits, RekonError, RekonResult};

fn json_node_budget_exceeded(v: &Json, max: usize) -> bool {
    // Keep a running counter and bail early when exceeding max
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max { return; }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for vv in map.values() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr.iter() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

/// Parse a `---` separated YAML stream. Empty documents are skipped, and
/// `kind: List` documents are flattened into their items.
///
/// `max_bytes` bounds the whole stream; `max_nodes` bounds each document on
/// its own, so long streams of small objects are fine.
pub fn parse_yaml(yaml: &str, limits: &ManifestLimits) -> RekonResult<Vec<Entity>> {
    if yaml.len() > limits.max_bytes {
        return Err(RekonError::Parse(format!("YAML payload too large (>{} bytes)", limits.max_bytes)));
    }
    let mut out = Vec::new();
    for (idx, doc) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let val = serde_yaml::Value::deserialize(doc)
            .map_err(|e| RekonError::Parse(format!("parsing YAML document {}: {}", idx, e)))?;
        if val.is_null() { continue; }
        let json = serde_json::to_value(val)
            .map_err(|e| RekonError::Parse(format!("converting YAML document {} to JSON: {}", idx, e)))?;
        if json_node_budget_exceeded(&json, limits.max_nodes) {
            return Err(RekonError::Parse(format!("YAML document {} too complex (>{} nodes)", idx, limits.max_nodes)));
        }
        push_flattened(json, &mut out)?;
    }
    Ok(out)
}

fn push_flattened(json: Json, out: &mut Vec<Entity>) -> RekonResult<()> {
    let is_list = json.get("kind").and_then(|k| k.as_str()).map(|k| k == "List" || k.ends_with("List")).unwrap_or(false)
        && json.get("items").map(|i| i.is_array()).unwrap_or(false);
    if is_list {
        if let Some(Json::Array(items)) = json.get("items") {
            for item in items {
                push_flattened(item.clone(), out)?;
            }
        }
        return Ok(());
    }
    out.push(Entity::from_json(json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Object;

    #[test]
    fn parses_multi_document_streams() {
        let y = "apiVersion: v1\nkind: Service\nmetadata:\n  name: a\n  uid: u1\n---\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: b\n  uid: u2\n";
        let es = parse_yaml(y, &ManifestLimits::default()).unwrap();
        assert_eq!(es.len(), 2);
        assert_eq!(es[0].kind(), "Service");
        assert_eq!(es[1].uid(), "u2");
    }

    #[test]
    fn flattens_lists() {
        let y = "apiVersion: v1\nkind: List\nitems:\n- apiVersion: v1\n  kind: ConfigMap\n  metadata: {name: a}\n- apiVersion: v1\n  kind: ConfigMap\n  metadata: {name: b}\n";
        let es = parse_yaml(y, &ManifestLimits::default()).unwrap();
        assert_eq!(es.iter().map(|e| e.meta().name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn enforces_budgets() {
        let y = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";
        let tiny = ManifestLimits { max_bytes: 8, max_nodes: 100 };
        assert!(parse_yaml(y, &tiny).unwrap_err().to_string().contains("too large"));
        let shallow = ManifestLimits { max_bytes: 1_000, max_nodes: 3 };
        assert!(parse_yaml(y, &shallow).unwrap_err().to_string().contains("too complex"));
    }

    #[test]
    fn node_budget_applies_per_document() {
        let doc = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  uid: u\ndata:\n  a: \"1\"\n  b: \"2\"\n";
        let stream = vec![doc; 4000].join("---\n");
        let limits = ManifestLimits { max_bytes: usize::MAX, max_nodes: 100 };
        assert_eq!(parse_yaml(&stream, &limits).unwrap().len(), 4000);
        // default limits take the same stream too
        assert_eq!(parse_yaml(&stream, &ManifestLimits::default()).unwrap().len(), 4000);

        let big = format!("{}---\nkind: ConfigMap\nmetadata:\n  name: big\ndata:\n{}", doc, (0..200).map(|i| format!("  k{}: v\n", i)).collect::<String>());
        let err = parse_yaml(&big, &limits).unwrap_err();
        assert!(err.to_string().contains("document 1 too complex"), "{}", err);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = parse_yaml("kind: [unterminated", &ManifestLimits::default()).unwrap_err();
        assert!(matches!(err, RekonError::Parse(_)));
    }
}
