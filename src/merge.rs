//! Strategic merge over untyped pod JSON.
//!
//! Only the pod-level list fields that carry a `patchMergeKey` in the core/v1
//! schema are merged element-wise. Every other list is replaced wholesale.

use serde_json::{Map, Value};

const SET_ELEMENT_ORDER: &str = "$setElementOrder";
const PATCH_DIRECTIVE: &str = "$patch";

pub fn merge_key(field: &str) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes"
        | "imagePullSecrets" => Some("name"),
        "volumeMounts" => Some("mountPath"),
        "ports" => Some("containerPort"),
        "volumeDevices" => Some("devicePath"),
        "resizePolicy" => Some("resourceName"),
        _ => None,
    }
}

/// Applies `overlay` on top of `base`.
///
/// `null` removes a key, objects recurse, merge-keyed lists merge by key and
/// anything else in the overlay replaces the base value.
pub fn strategic_merge(base: Value, overlay: &Value) -> Value {
    let (Value::Object(mut base), Value::Object(overlay)) = (base, overlay) else {
        return overlay.clone();
    };

    for (field, patch) in overlay {
        if field.starts_with('$') {
            continue;
        }
        if patch.is_null() {
            base.remove(field);
            continue;
        }

        let merged = match (base.remove(field), patch, merge_key(field)) {
            (Some(current @ Value::Object(_)), Value::Object(_), _) => {
                strategic_merge(current, patch)
            }
            (Some(Value::Array(current)), Value::Array(items), Some(key)) => {
                Value::Array(merge_list(current, items, key))
            }
            _ => patch.clone(),
        };
        base.insert(field.clone(), merged);
    }

    Value::Object(base)
}

fn merge_list(mut current: Vec<Value>, items: &[Value], key: &str) -> Vec<Value> {
    for item in items {
        let Some(identity) = item.get(key) else {
            current.push(item.clone());
            continue;
        };
        let position = current
            .iter()
            .position(|existing| existing.get(key) == Some(identity));
        let delete = item.get(PATCH_DIRECTIVE).and_then(Value::as_str) == Some("delete");

        match (position, delete) {
            (Some(index), true) => {
                current.remove(index);
            }
            (None, true) => {}
            (Some(index), false) => {
                let existing = std::mem::take(&mut current[index]);
                current[index] = strategic_merge(existing, item);
            }
            (None, false) => current.push(strategic_merge(Value::Object(Map::new()), item)),
        }
    }
    current
}

/// Computes the patch that turns `original` into `modified`.
///
/// The output has the shape the API server's own two-way merge produces:
/// changed keys only, `null` for removed keys, and for merge-keyed lists the
/// changed elements plus a `$setElementOrder/<field>` directive.
pub fn two_way_diff(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            Value::Object(diff_maps(original, modified))
        }
        _ if original == modified => Value::Object(Map::new()),
        _ => modified.clone(),
    }
}

fn diff_maps(original: &Map<String, Value>, modified: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for (field, after) in modified {
        let Some(before) = original.get(field) else {
            patch.insert(field.clone(), after.clone());
            continue;
        };
        if before == after {
            continue;
        }

        match (before, after, merge_key(field)) {
            (Value::Object(before), Value::Object(after), _) => {
                let nested = diff_maps(before, after);
                if !nested.is_empty() {
                    patch.insert(field.clone(), Value::Object(nested));
                }
            }
            (Value::Array(before), Value::Array(after), Some(key))
                if keyed(before, key) && keyed(after, key) =>
            {
                diff_list(field, key, before, after, &mut patch);
            }
            _ => {
                patch.insert(field.clone(), after.clone());
            }
        }
    }

    for field in original.keys() {
        if !modified.contains_key(field) {
            patch.insert(field.clone(), Value::Null);
        }
    }

    patch
}

fn diff_list(
    field: &str,
    key: &str,
    before: &[Value],
    after: &[Value],
    patch: &mut Map<String, Value>,
) {
    let mut changes = Vec::new();

    for item in after {
        let identity = item.get(key);
        match before.iter().find(|old| old.get(key) == identity) {
            None => changes.push(item.clone()),
            Some(old) if old == item => {}
            Some(old) => {
                if let (Value::Object(old), Value::Object(new), Some(identity)) = (old, item, identity)
                {
                    let mut nested = diff_maps(old, new);
                    nested.insert(key.to_string(), identity.clone());
                    changes.push(Value::Object(nested));
                }
            }
        }
    }

    for old in before {
        let identity = old.get(key);
        if let Some(identity) = identity
            && !after.iter().any(|item| item.get(key) == Some(identity))
        {
            let mut removal = Map::new();
            removal.insert(key.to_string(), identity.clone());
            removal.insert(PATCH_DIRECTIVE.to_string(), Value::from("delete"));
            changes.push(Value::Object(removal));
        }
    }

    if changes.is_empty() {
        return;
    }

    let order = after
        .iter()
        .filter_map(|item| item.get(key))
        .map(|identity| {
            let mut entry = Map::new();
            entry.insert(key.to_string(), identity.clone());
            Value::Object(entry)
        })
        .collect();
    patch.insert(format!("{SET_ELEMENT_ORDER}/{field}"), Value::Array(order));
    patch.insert(field.to_string(), Value::Array(changes));
}

fn keyed(items: &[Value], key: &str) -> bool {
    items.iter().all(|item| item.get(key).is_some())
}

#[cfg(test)]
mod tests {
    use super::{merge_key, strategic_merge, two_way_diff};
    use serde_json::json;

    #[test]
    fn merge_keys_cover_container_lists() {
        assert_eq!(merge_key("ephemeralContainers"), Some("name"));
        assert_eq!(merge_key("volumeMounts"), Some("mountPath"));
        assert_eq!(merge_key("args"), None);
    }

    #[test]
    fn overlay_merges_env_by_name_and_replaces_plain_lists() {
        let base = json!({
            "name": "debugger-abcde",
            "image": "busybox",
            "command": ["sh"],
            "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}],
            "stdin": true
        });
        let overlay = json!({
            "command": ["bash", "-l"],
            "env": [{"name": "B", "value": "20"}, {"name": "C", "value": "3"}],
            "stdin": null,
            "securityContext": {"privileged": true}
        });

        let merged = strategic_merge(base, &overlay);

        assert_eq!(merged["command"], json!(["bash", "-l"]));
        assert_eq!(
            merged["env"],
            json!([
                {"name": "A", "value": "1"},
                {"name": "B", "value": "20"},
                {"name": "C", "value": "3"}
            ])
        );
        assert!(merged.get("stdin").is_none());
        assert_eq!(merged["securityContext"]["privileged"], true);
        assert_eq!(merged["image"], "busybox");
    }

    #[test]
    fn overlay_can_delete_keyed_elements() {
        let base = json!({"volumeMounts": [{"mountPath": "/a"}, {"mountPath": "/b"}]});
        let overlay = json!({"volumeMounts": [{"mountPath": "/a", "$patch": "delete"}]});

        let merged = strategic_merge(base, &overlay);
        assert_eq!(merged["volumeMounts"], json!([{"mountPath": "/b"}]));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let base = json!({"securityContext": {"capabilities": {"add": ["NET_ADMIN"]}, "runAsUser": 0}});
        let overlay = json!({"securityContext": {"capabilities": {"drop": ["ALL"]}}});

        let merged = strategic_merge(base, &overlay);
        assert_eq!(
            merged["securityContext"],
            json!({"capabilities": {"add": ["NET_ADMIN"], "drop": ["ALL"]}, "runAsUser": 0})
        );
    }

    #[test]
    fn diff_of_appended_ephemeral_container_sets_element_order() {
        let original = json!({
            "metadata": {"name": "web-1"},
            "spec": {
                "containers": [{"name": "app", "image": "nginx"}],
                "ephemeralContainers": [{"name": "debugger-old", "image": "busybox"}]
            }
        });
        let mut modified = original.clone();
        modified["spec"]["ephemeralContainers"]
            .as_array_mut()
            .expect("array")
            .push(json!({"name": "debugger-new", "image": "netshoot"}));

        let patch = two_way_diff(&original, &modified);

        assert_eq!(
            patch,
            json!({
                "spec": {
                    "$setElementOrder/ephemeralContainers": [
                        {"name": "debugger-old"},
                        {"name": "debugger-new"}
                    ],
                    "ephemeralContainers": [{"name": "debugger-new", "image": "netshoot"}]
                }
            })
        );
    }

    #[test]
    fn diff_adds_missing_list_whole() {
        let original = json!({"spec": {"containers": [{"name": "app"}]}});
        let modified = json!({
            "spec": {
                "containers": [{"name": "app"}],
                "ephemeralContainers": [{"name": "debugger-x"}]
            }
        });

        let patch = two_way_diff(&original, &modified);
        assert_eq!(
            patch,
            json!({"spec": {"ephemeralContainers": [{"name": "debugger-x"}]}})
        );
    }

    #[test]
    fn diff_marks_removed_keys_and_elements() {
        let original = json!({
            "labels": {"a": "1", "b": "2"},
            "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}]
        });
        let modified = json!({
            "labels": {"a": "1"},
            "env": [{"name": "A", "value": "10"}]
        });

        let patch = two_way_diff(&original, &modified);
        assert_eq!(
            patch,
            json!({
                "labels": {"b": null},
                "$setElementOrder/env": [{"name": "A"}],
                "env": [
                    {"name": "A", "value": "10"},
                    {"name": "B", "$patch": "delete"}
                ]
            })
        );
    }

    #[test]
    fn diff_of_equal_documents_is_empty() {
        let pod = json!({"spec": {"containers": [{"name": "app"}]}});
        assert_eq!(two_way_diff(&pod, &pod), json!({}));
    }

    #[test]
    fn merging_the_diff_reproduces_the_modified_document() {
        let original = json!({
            "spec": {
                "containers": [{"name": "app", "image": "nginx"}],
                "ephemeralContainers": [{"name": "debugger-1", "image": "busybox"}]
            }
        });
        let modified = json!({
            "spec": {
                "containers": [{"name": "app", "image": "nginx"}],
                "ephemeralContainers": [
                    {"name": "debugger-1", "image": "busybox"},
                    {"name": "debugger-2", "image": "netshoot", "tty": true}
                ]
            }
        });

        let patch = two_way_diff(&original, &modified);
        assert_eq!(strategic_merge(original, &patch), modified);
    }
}
