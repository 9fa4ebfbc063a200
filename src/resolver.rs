use k8s_openapi::api::core::v1::Container;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ResolutionError;
use crate::profile::{BuiltinProfile, Catalog, ProfileSource, PullPolicy};

/// Values given on the command line that take precedence over the profile.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub image: Option<String>,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    BuiltIn(BuiltinProfile),
    Overlay { path: PathBuf, document: Value },
}

/// A profile with every optional value settled, ready for the patch builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProfile {
    pub name: String,
    pub template: Template,
    pub image: String,
    pub namespace: Option<String>,
    pub pull_policy: PullPolicy,
    pub target_container: Option<String>,
    pub match_labels: BTreeMap<String, String>,
    pub container_name: Option<String>,
    pub command: Vec<String>,
    pub args_only: bool,
    pub env: BTreeMap<String, String>,
}

pub fn resolve(
    catalog: &Catalog,
    name: &str,
    overrides: &Overrides,
) -> Result<ResolvedProfile, ResolutionError> {
    let Some(profile) = catalog.find(name) else {
        return Err(ResolutionError::NotFound {
            name: name.to_string(),
            known: catalog.names(),
        });
    };

    let image = pick(overrides.image.as_deref(), profile.image.as_deref()).ok_or_else(|| {
        ResolutionError::MissingImage {
            name: profile.name.clone(),
        }
    })?;

    let template = match &profile.source {
        ProfileSource::BuiltIn(kind) => Template::BuiltIn(*kind),
        ProfileSource::File(path) => Template::Overlay {
            document: read_overlay(&profile.name, path)?,
            path: path.clone(),
        },
    };

    Ok(ResolvedProfile {
        name: profile.name.clone(),
        template,
        image,
        namespace: profile.namespace.clone(),
        pull_policy: profile.pull_policy.unwrap_or_default(),
        target_container: profile.target_container.clone(),
        match_labels: profile.match_labels.clone(),
        container_name: pick(
            overrides.container_name.as_deref(),
            profile.container_name.as_deref(),
        ),
        command: profile.command.clone(),
        args_only: profile.args_only,
        env: profile.env.clone(),
    })
}

/// Reads a partial container spec and checks that it decodes as a `Container`.
pub fn read_overlay(name: &str, path: &Path) -> Result<Value, ResolutionError> {
    let raw = std::fs::read(path).map_err(|source| ResolutionError::UnreadableOverlay {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |source| ResolutionError::InvalidOverlay {
        name: name.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let document = serde_json::from_slice::<Value>(&raw).map_err(invalid)?;
    if !document.is_object() {
        return Err(invalid(<serde_json::Error as serde::de::Error>::custom(
            "container spec must be a JSON object",
        )));
    }

    // Partial specs routinely omit the name, which Container requires.
    let mut probe = document.clone();
    if let Value::Object(map) = &mut probe {
        map.entry("name")
            .or_insert_with(|| Value::String("probe".to_string()));
    }
    serde_json::from_value::<Container>(probe).map_err(invalid)?;

    Ok(document)
}

fn pick(preferred: Option<&str>, fallback: Option<&str>) -> Option<String> {
    preferred
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or(fallback)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{Overrides, Template, read_overlay, resolve};
    use crate::error::ResolutionError;
    use crate::profile::{BuiltinProfile, Catalog, ProfileSpec, PullPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overlay_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp overlay");
        file.write_all(contents.as_bytes()).expect("write overlay");
        file
    }

    fn catalog(specs: Vec<ProfileSpec>) -> Catalog {
        Catalog::load(specs, None).expect("catalog should load")
    }

    #[test]
    fn override_image_wins_and_pull_policy_defaults() {
        let catalog = catalog(vec![ProfileSpec {
            name: "net".to_string(),
            profile: "netadmin".to_string(),
            image: Some("nicolaka/netshoot".to_string()),
            ..ProfileSpec::default()
        }]);

        let resolved = resolve(
            &catalog,
            "net",
            &Overrides {
                image: Some("busybox".to_string()),
                container_name: None,
            },
        )
        .expect("profile resolves");

        assert_eq!(resolved.image, "busybox");
        assert_eq!(resolved.pull_policy, PullPolicy::IfNotPresent);
        assert_eq!(resolved.template, Template::BuiltIn(BuiltinProfile::Netadmin));
    }

    #[test]
    fn unknown_profile_lists_known_names() {
        let catalog = catalog(vec![ProfileSpec {
            name: "net".to_string(),
            profile: "general".to_string(),
            ..ProfileSpec::default()
        }]);

        let error = resolve(&catalog, "nope", &Overrides::default()).expect_err("not found");
        assert!(matches!(error, ResolutionError::NotFound { .. }));
        assert!(error.to_string().contains("net"));
    }

    #[test]
    fn image_is_required() {
        let catalog = catalog(vec![ProfileSpec {
            name: "bare".to_string(),
            profile: "general".to_string(),
            ..ProfileSpec::default()
        }]);

        let error = resolve(&catalog, "bare", &Overrides::default()).expect_err("no image");
        assert!(matches!(error, ResolutionError::MissingImage { name } if name == "bare"));
    }

    #[test]
    fn overlay_file_is_loaded_into_template() {
        let overlay =
            overlay_file(r#"{"securityContext": {"capabilities": {"add": ["SYS_ADMIN"]}}}"#);
        let catalog = catalog(vec![ProfileSpec {
            name: "custom".to_string(),
            profile: overlay.path().display().to_string(),
            image: Some("busybox".to_string()),
            container_name: Some("from-profile".to_string()),
            ..ProfileSpec::default()
        }]);

        let resolved = resolve(
            &catalog,
            "custom",
            &Overrides {
                image: None,
                container_name: Some("from-cli".to_string()),
            },
        )
        .expect("overlay resolves");

        let Template::Overlay { document, .. } = &resolved.template else {
            panic!("expected overlay template");
        };
        assert_eq!(
            document["securityContext"]["capabilities"]["add"][0],
            "SYS_ADMIN"
        );
        assert_eq!(resolved.container_name.as_deref(), Some("from-cli"));
    }

    #[test]
    fn malformed_overlay_is_rejected() {
        let wrong_shape = overlay_file(r#"{"env": "not-a-list"}"#);
        let error = read_overlay("custom", wrong_shape.path()).expect_err("invalid overlay");
        assert!(matches!(error, ResolutionError::InvalidOverlay { .. }));

        let not_json = overlay_file("just text");
        let error = read_overlay("custom", not_json.path()).expect_err("invalid json");
        assert!(matches!(error, ResolutionError::InvalidOverlay { .. }));
    }

    #[test]
    fn missing_overlay_is_unreadable() {
        let error = read_overlay("custom", std::path::Path::new("/nonexistent/dpm.json"))
            .expect_err("missing file");
        assert!(matches!(error, ResolutionError::UnreadableOverlay { .. }));
    }
}
