//! Generic configuration tree helpers.
//!
//! Configuration documents, the parameter dictionary and dotted container
//! lookups all operate on [`serde_yaml::Value`]: a tagged tree of scalars,
//! sequences and mappings. Dotted paths (`a.b.0.c`) walk mappings by key and
//! sequences by index.

pub use serde_yaml::{Mapping, Value};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Look up `path` inside `tree`. An empty path names nothing.
pub fn get_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split(PATH_SEPARATOR)
        .try_fold(tree, |node, segment| match node {
            Value::Mapping(map) => map.get(segment),
            Value::Sequence(seq) => segment.parse::<usize>().ok().and_then(|i| seq.get(i)),
            _ => None,
        })
}

/// Recursively merge `overlay` into `base`.
///
/// Mappings are merged key by key; any other overlay value replaces the base
/// value outright.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Render a mapping key or scalar as a path segment / plain string.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Walk every string leaf of `tree`, replacing it with the visitor's result.
///
/// The visitor receives the leaf and the property path leading to it
/// (mapping keys and sequence indices).
pub fn try_map_strings<E, F>(tree: Value, visitor: &mut F) -> Result<Value, E>
where
    F: FnMut(String, &[String]) -> Result<Value, E>,
{
    let mut props = Vec::new();
    walk(tree, &mut props, visitor)
}

fn walk<E, F>(node: Value, props: &mut Vec<String>, visitor: &mut F) -> Result<Value, E>
where
    F: FnMut(String, &[String]) -> Result<Value, E>,
{
    match node {
        Value::String(s) => visitor(s, props),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                props.push(scalar_to_string(&key));
                let value = walk(value, props, visitor)?;
                props.pop();
                out.insert(key, value);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for (index, value) in seq.into_iter().enumerate() {
                props.push(index.to_string());
                out.push(walk(value, props, visitor)?);
                props.pop();
            }
            Ok(Value::Sequence(out))
        }
        Value::Tagged(tagged) => {
            let mut tagged = *tagged;
            tagged.value = walk(tagged.value, props, visitor)?;
            Ok(Value::Tagged(Box::new(tagged)))
        }
        scalar => Ok(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn get_path_walks_mappings_and_sequences() {
        let tree = yaml("a:\n  b:\n    - x\n    - c: 3\n");
        assert_eq!(get_path(&tree, "a.b.0"), Some(&Value::from("x")));
        assert_eq!(get_path(&tree, "a.b.1.c"), Some(&Value::from(3)));
        assert_eq!(get_path(&tree, "a.z"), None);
        assert_eq!(get_path(&tree, ""), None);
    }

    #[test]
    fn deep_merge_overlays_nested_keys() {
        let mut base = yaml("db:\n  host: h\n  port: 1\nlist: [1, 2]\n");
        deep_merge(&mut base, yaml("db:\n  port: 2\nlist: [3]\n"));
        assert_eq!(base, yaml("db:\n  host: h\n  port: 2\nlist: [3]\n"));
    }

    #[test]
    fn map_strings_reports_property_paths() {
        let tree = yaml("a:\n  b: one\n  c: [two]\nn: 1\n");
        let mut seen = Vec::new();
        let out = try_map_strings::<(), _>(tree, &mut |s, props| {
            seen.push(props.join("."));
            Ok(Value::String(s.to_uppercase()))
        })
        .unwrap();

        assert_eq!(seen, vec!["a.b", "a.c.0"]);
        assert_eq!(out, yaml("a:\n  b: ONE\n  c: [TWO]\nn: 1\n"));
    }
}
