use k8s_openapi::api::core::v1::{
    Capabilities, EnvVar, EphemeralContainer, Pod, SeccompProfile, SecurityContext,
};
use rand::Rng;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::error::PatchError;
use crate::merge::{strategic_merge, two_way_diff};
use crate::profile::BuiltinProfile;
use crate::resolver::{ResolvedProfile, Template};

pub const NAME_PREFIX: &str = "debugger";
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 5;

/// The injected container and the patch that adds it to the live pod.
#[derive(Debug, Clone)]
pub struct PatchPlan {
    pub container: EphemeralContainer,
    pub patch: Value,
}

pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub fn existing_container_names(pod: &Pod) -> HashSet<String> {
    let Some(spec) = pod.spec.as_ref() else {
        return HashSet::new();
    };

    let ephemeral = spec
        .ephemeral_containers
        .iter()
        .flatten()
        .map(|container| container.name.clone());
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .map(|container| container.name.clone())
        .chain(ephemeral)
        .collect()
}

/// Returns the requested name verbatim, otherwise draws `debugger-<suffix>`
/// until it collides with nothing on the pod.
pub fn container_name<F>(requested: Option<&str>, existing: &HashSet<String>, mut suffix: F) -> String
where
    F: FnMut() -> String,
{
    if let Some(requested) = requested.map(str::trim).filter(|name| !name.is_empty()) {
        return requested.to_string();
    }

    loop {
        let candidate = format!("{NAME_PREFIX}-{}", suffix());
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
}

pub fn debug_container(profile: &ResolvedProfile, name: &str) -> EphemeralContainer {
    let command = (!profile.command.is_empty()).then(|| profile.command.clone());
    let (command, args) = if profile.args_only {
        (None, command)
    } else {
        (command, None)
    };
    let env = profile
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..EnvVar::default()
        })
        .collect::<Vec<_>>();

    EphemeralContainer {
        name: name.to_string(),
        image: Some(profile.image.clone()),
        image_pull_policy: Some(profile.pull_policy.as_str().to_string()),
        command,
        args,
        env: (!env.is_empty()).then_some(env),
        stdin: Some(true),
        tty: Some(true),
        termination_message_policy: Some("File".to_string()),
        target_container_name: profile.target_container.clone(),
        ..EphemeralContainer::default()
    }
}

/// Mirrors what `kubectl debug --profile=<kind>` does to an ephemeral container.
pub fn apply_builtin(container: &mut EphemeralContainer, kind: BuiltinProfile) {
    match kind {
        BuiltinProfile::Legacy | BuiltinProfile::Baseline => {}
        BuiltinProfile::General => add_capabilities(container, &["SYS_PTRACE"]),
        BuiltinProfile::Netadmin => add_capabilities(container, &["NET_ADMIN", "NET_RAW"]),
        BuiltinProfile::Sysadmin => {
            security_context(container).privileged = Some(true);
        }
        BuiltinProfile::Restricted => {
            let context = security_context(container);
            context.run_as_non_root = Some(true);
            context.allow_privilege_escalation = Some(false);
            context.capabilities = Some(Capabilities {
                add: None,
                drop: Some(vec!["ALL".to_string()]),
            });
            context.seccomp_profile = Some(SeccompProfile {
                type_: "RuntimeDefault".to_string(),
                ..SeccompProfile::default()
            });
        }
    }
}

pub fn apply_overlay(
    container: EphemeralContainer,
    overlay: &Value,
) -> Result<EphemeralContainer, PatchError> {
    let Value::Object(fields) = overlay else {
        return Err(PatchError::OverlayNotObject);
    };

    let mut overlay = fields.clone();
    overlay.insert("name".to_string(), Value::String(container.name.clone()));

    let base = serde_json::to_value(&container).map_err(|source| PatchError::Encode {
        what: "ephemeral container",
        source,
    })?;
    let merged = strategic_merge(base, &Value::Object(overlay));
    serde_json::from_value(merged).map_err(|source| PatchError::Decode {
        what: "ephemeral container",
        source,
    })
}

pub fn build_patch(pod: &Pod, profile: &ResolvedProfile, name: &str) -> Result<PatchPlan, PatchError> {
    let mut container = debug_container(profile, name);
    match &profile.template {
        Template::BuiltIn(kind) => apply_builtin(&mut container, *kind),
        Template::Overlay { path, document } => {
            debug!(overlay = %path.display(), container = name, "merging custom profile");
            container = apply_overlay(container, document)?;
        }
    }

    let mut debug_pod = pod.clone();
    debug_pod
        .spec
        .get_or_insert_with(Default::default)
        .ephemeral_containers
        .get_or_insert_with(Vec::new)
        .push(container);

    let container = debug_pod
        .spec
        .as_ref()
        .and_then(|spec| spec.ephemeral_containers.as_ref())
        .and_then(|containers| containers.iter().find(|container| container.name == name))
        .cloned()
        .ok_or_else(|| PatchError::MissingContainer {
            container: name.to_string(),
        })?;

    let original = serde_json::to_value(pod).map_err(|source| PatchError::Encode {
        what: "pod",
        source,
    })?;
    let modified = serde_json::to_value(&debug_pod).map_err(|source| PatchError::Encode {
        what: "debug pod",
        source,
    })?;

    Ok(PatchPlan {
        patch: two_way_diff(&original, &modified),
        container,
    })
}

fn security_context(container: &mut EphemeralContainer) -> &mut SecurityContext {
    container
        .security_context
        .get_or_insert_with(SecurityContext::default)
}

fn add_capabilities(container: &mut EphemeralContainer, capabilities: &[&str]) {
    let added = security_context(container)
        .capabilities
        .get_or_insert_with(Capabilities::default)
        .add
        .get_or_insert_with(Vec::new);
    for capability in capabilities {
        if !added.iter().any(|existing| existing == capability) {
            added.push((*capability).to_string());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        apply_overlay, build_patch, container_name, debug_container, existing_container_names,
        random_suffix,
    };
    use crate::profile::{BuiltinProfile, PullPolicy};
    use crate::resolver::{ResolvedProfile, Template};
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::json;
    use std::collections::{BTreeMap, HashSet};
    use std::path::PathBuf;

    pub(crate) fn sample_pod() -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "default", "labels": {"app": "x"}},
            "spec": {
                "initContainers": [{"name": "init"}],
                "containers": [{"name": "app", "image": "nginx"}],
                "ephemeralContainers": [{"name": "debugger-aaaaa", "image": "busybox"}]
            }
        }))
        .expect("valid pod")
    }

    pub(crate) fn resolved(template: Template) -> ResolvedProfile {
        ResolvedProfile {
            name: "net".to_string(),
            template,
            image: "nicolaka/netshoot".to_string(),
            namespace: None,
            pull_policy: PullPolicy::IfNotPresent,
            target_container: Some("app".to_string()),
            match_labels: BTreeMap::from([("app".to_string(), "x".to_string())]),
            container_name: None,
            command: Vec::new(),
            args_only: false,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn existing_names_cover_every_container_kind() {
        let names = existing_container_names(&sample_pod());
        let expected = ["init", "app", "debugger-aaaaa"]
            .into_iter()
            .map(str::to_string)
            .collect::<HashSet<_>>();
        assert_eq!(names, expected);
    }

    #[test]
    fn generated_name_retries_after_collision() {
        let existing = existing_container_names(&sample_pod());
        let mut draws = vec!["bbbbb", "aaaaa"];
        let mut calls = 0;
        let name = container_name(None, &existing, || {
            calls += 1;
            draws.pop().unwrap_or("zzzzz").to_string()
        });

        assert_eq!(name, "debugger-bbbbb");
        assert_eq!(calls, 2);
    }

    #[test]
    fn explicit_name_is_used_verbatim() {
        let existing = existing_container_names(&sample_pod());
        let name = container_name(Some("app"), &existing, || unreachable!());
        assert_eq!(name, "app");
    }

    #[test]
    fn random_suffix_uses_lowercase_alphanumerics() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 5);
        assert!(
            suffix
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        );
    }

    #[test]
    fn netadmin_patch_appends_container_with_capabilities() {
        let plan = build_patch(
            &sample_pod(),
            &resolved(Template::BuiltIn(BuiltinProfile::Netadmin)),
            "debugger-xyz12",
        )
        .expect("patch builds");

        let spec = &plan.patch["spec"];
        assert_eq!(
            spec["$setElementOrder/ephemeralContainers"],
            json!([{"name": "debugger-aaaaa"}, {"name": "debugger-xyz12"}])
        );
        let added = &spec["ephemeralContainers"][0];
        assert_eq!(added["name"], "debugger-xyz12");
        assert_eq!(added["image"], "nicolaka/netshoot");
        assert_eq!(added["imagePullPolicy"], "IfNotPresent");
        assert_eq!(added["targetContainerName"], "app");
        assert_eq!(added["stdin"], true);
        assert_eq!(added["tty"], true);
        assert_eq!(added["terminationMessagePolicy"], "File");
        assert_eq!(
            added["securityContext"]["capabilities"]["add"],
            json!(["NET_ADMIN", "NET_RAW"])
        );
        assert!(spec.get("containers").is_none());
        assert!(plan.patch.get("metadata").is_none());
        assert_eq!(plan.container.name, "debugger-xyz12");
    }

    #[test]
    fn restricted_drops_all_capabilities() {
        let plan = build_patch(
            &sample_pod(),
            &resolved(Template::BuiltIn(BuiltinProfile::Restricted)),
            "debugger-r",
        )
        .expect("patch builds");

        let context = plan
            .container
            .security_context
            .expect("security context set");
        assert_eq!(context.run_as_non_root, Some(true));
        assert_eq!(context.allow_privilege_escalation, Some(false));
        assert_eq!(
            context.capabilities.and_then(|caps| caps.drop),
            Some(vec!["ALL".to_string()])
        );
        assert_eq!(
            context.seccomp_profile.map(|profile| profile.type_),
            Some("RuntimeDefault".to_string())
        );
    }

    #[test]
    fn command_goes_to_args_when_args_only() {
        let mut profile = resolved(Template::BuiltIn(BuiltinProfile::Legacy));
        profile.command = vec!["sleep".to_string(), "3600".to_string()];
        profile.args_only = true;
        profile.env = BTreeMap::from([("MODE".to_string(), "debug".to_string())]);

        let plan = build_patch(&sample_pod(), &profile, "debugger-args").expect("patch builds");
        assert_eq!(plan.container.command, None);
        assert_eq!(
            plan.container.args,
            Some(vec!["sleep".to_string(), "3600".to_string()])
        );
        let env = plan.container.env.expect("env set");
        assert_eq!(env[0].name, "MODE");
        assert_eq!(env[0].value.as_deref(), Some("debug"));
    }

    #[test]
    fn overlay_is_merged_and_name_is_forced() {
        let profile = resolved(Template::Overlay {
            path: PathBuf::from("profiles/custom.json"),
            document: json!({
                "name": "ignored",
                "command": ["bash"],
                "securityContext": {"capabilities": {"add": ["SYS_ADMIN"]}},
                "env": [{"name": "FROM_OVERLAY", "value": "1"}]
            }),
        });

        let plan = build_patch(&sample_pod(), &profile, "debugger-ovl").expect("patch builds");
        assert_eq!(plan.container.name, "debugger-ovl");
        assert_eq!(plan.container.command, Some(vec!["bash".to_string()]));
        assert_eq!(plan.container.image.as_deref(), Some("nicolaka/netshoot"));
        let added = plan
            .container
            .security_context
            .and_then(|context| context.capabilities)
            .and_then(|caps| caps.add);
        assert_eq!(added, Some(vec!["SYS_ADMIN".to_string()]));
    }

    #[test]
    fn resources_overlay_leaves_other_fields_alone() {
        let base = debug_container(
            &resolved(Template::BuiltIn(BuiltinProfile::General)),
            "debugger-res01",
        );
        let before = serde_json::to_value(&base).expect("encode base");
        assert!(before.get("resources").is_none());

        let merged = apply_overlay(base, &json!({"resources": {"limits": {"cpu": "100m"}}}))
            .expect("overlay merges");
        let mut after = serde_json::to_value(&merged).expect("encode merged");

        assert_eq!(after["resources"], json!({"limits": {"cpu": "100m"}}));
        after
            .as_object_mut()
            .expect("container object")
            .remove("resources");
        assert_eq!(after, before);
    }

    #[test]
    fn pod_without_ephemeral_containers_gets_exactly_one() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-2", "namespace": "default"},
            "spec": {"containers": [{"name": "app", "image": "nginx"}]}
        }))
        .expect("valid pod");
        let profile = ResolvedProfile {
            image: "busybox".to_string(),
            target_container: None,
            ..resolved(Template::BuiltIn(BuiltinProfile::Legacy))
        };

        let plan = build_patch(&pod, &profile, "debugger-new01").expect("patch builds");

        let added = plan.patch["spec"]["ephemeralContainers"]
            .as_array()
            .expect("ephemeral container list");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0]["name"], "debugger-new01");
        assert_eq!(added[0]["image"], "busybox");
        assert!(plan.patch.get("metadata").is_none());
        assert!(plan.patch["spec"].get("containers").is_none());
    }

    #[test]
    fn non_object_overlay_is_rejected() {
        let profile = resolved(Template::Overlay {
            path: PathBuf::from("profiles/list.json"),
            document: json!(["not", "an", "object"]),
        });

        assert!(build_patch(&sample_pod(), &profile, "debugger-x").is_err());
    }
}
