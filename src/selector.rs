use std::collections::BTreeMap;

use crate::error::SelectionError;
use crate::k8s::PodBackend;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Picks the namespace to debug in.
///
/// A context namespace other than `default` was chosen on purpose (flag or
/// kubeconfig context) and beats the profile's namespace.
pub fn select_namespace(profile_namespace: Option<&str>, context_namespace: &str) -> String {
    let context_namespace = context_namespace.trim();
    if !context_namespace.is_empty() && context_namespace != DEFAULT_NAMESPACE {
        return context_namespace.to_string();
    }

    profile_namespace
        .map(str::trim)
        .filter(|namespace| !namespace.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string()
}

pub async fn select_targets<B>(
    backend: &B,
    namespace: &str,
    explicit: &[String],
    match_labels: &BTreeMap<String, String>,
) -> Result<Vec<String>, SelectionError>
where
    B: PodBackend,
{
    if explicit.len() > 1 {
        return Err(SelectionError::TooManyTargets {
            names: explicit.to_vec(),
        });
    }
    if !explicit.is_empty() {
        return Ok(explicit.to_vec());
    }
    if match_labels.is_empty() {
        return Err(SelectionError::NoSelector);
    }

    let mut names = backend
        .list_pod_names(namespace, match_labels)
        .await
        .map_err(|source| SelectionError::Lookup {
            namespace: namespace.to_string(),
            source,
        })?;
    if names.is_empty() {
        return Err(SelectionError::NoMatches {
            namespace: namespace.to_string(),
            selector: selector_query(match_labels),
        });
    }

    names.sort();
    Ok(names)
}

/// Narrows the selection to exactly one pod.
pub async fn single_target<B>(
    backend: &B,
    namespace: &str,
    explicit: &[String],
    match_labels: &BTreeMap<String, String>,
) -> Result<String, SelectionError>
where
    B: PodBackend,
{
    let mut names = select_targets(backend, namespace, explicit, match_labels).await?;
    if names.len() > 1 {
        return Err(SelectionError::Ambiguous {
            namespace: namespace.to_string(),
            selector: selector_query(match_labels),
            names,
        });
    }

    names.pop().ok_or(SelectionError::NoSelector)
}

pub fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
