use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::attach;
use crate::error::{ConfigError, ValidationError};
use crate::resolver;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Default)]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

/// Debugging profiles `kubectl debug --profile` knows about.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BuiltinProfile {
    Legacy,
    General,
    Baseline,
    Restricted,
    Netadmin,
    Sysadmin,
}

impl BuiltinProfile {
    pub const ALL: [Self; 6] = [
        Self::Legacy,
        Self::General,
        Self::Baseline,
        Self::Restricted,
        Self::Netadmin,
        Self::Sysadmin,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::General => "general",
            Self::Baseline => "baseline",
            Self::Restricted => "restricted",
            Self::Netadmin => "netadmin",
            Self::Sysadmin => "sysadmin",
        }
    }

    pub fn from_keyword(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|profile| profile.keyword().eq_ignore_ascii_case(token))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProfileSource {
    BuiltIn(BuiltinProfile),
    File(PathBuf),
}

impl ProfileSource {
    pub fn parse(raw: &str) -> Self {
        match BuiltinProfile::from_keyword(raw) {
            Some(profile) => Self::BuiltIn(profile),
            None => Self::File(expand_home(raw.trim())),
        }
    }
}

impl Display for ProfileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuiltIn(profile) => write!(f, "{}", profile.keyword()),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One profile entry as it appears in the configuration file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "customProfileFile")]
    pub profile: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub image_pull_policy: Option<PullPolicy>,
    #[serde(default)]
    pub target_container: Option<String>,
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args_only: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProfileSpec {
    fn into_profile(self) -> Profile {
        Profile {
            source: ProfileSource::parse(&self.profile),
            name: self.name.trim().to_string(),
            image: non_empty(self.image),
            namespace: non_empty(self.namespace),
            pull_policy: self.image_pull_policy,
            target_container: non_empty(self.target_container),
            match_labels: self.match_labels,
            container_name: non_empty(self.container_name),
            command: self.command,
            args_only: self.args_only,
            env: self.env,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub source: ProfileSource,
    pub image: Option<String>,
    pub namespace: Option<String>,
    pub pull_policy: Option<PullPolicy>,
    pub target_container: Option<String>,
    pub match_labels: BTreeMap<String, String>,
    pub container_name: Option<String>,
    pub command: Vec<String>,
    pub args_only: bool,
    pub env: BTreeMap<String, String>,
}

impl Profile {
    pub fn is_built_in(&self) -> bool {
        matches!(self.source, ProfileSource::BuiltIn(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    profiles: Vec<Profile>,
    tool_path: Option<PathBuf>,
}

impl Catalog {
    /// Builds the catalog from raw config entries.
    ///
    /// The first entry wins when names collide case-insensitively. A single
    /// malformed entry rejects the whole batch.
    pub fn load(specs: Vec<ProfileSpec>, tool_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::<String>::new();
        let mut kept = Vec::with_capacity(specs.len());
        for spec in specs {
            let key = name_key(&spec.name);
            if !key.is_empty() && !seen.insert(key) {
                info!(
                    "duplicate profile name {} found - dropping the one with profile {}",
                    spec.name, spec.profile
                );
                continue;
            }
            kept.push(spec);
        }

        let errors = structural_errors(&kept);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        let mut profiles = kept
            .into_iter()
            .map(ProfileSpec::into_profile)
            .collect::<Vec<_>>();
        profiles.sort_by_cached_key(|profile| name_key(&profile.name));

        Ok(Self {
            profiles,
            tool_path,
        })
    }

    pub fn sorted_view(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn tool_path(&self) -> Option<&Path> {
        self.tool_path.as_deref()
    }

    pub fn find(&self, name: &str) -> Option<&Profile> {
        let key = name_key(name);
        self.profiles
            .iter()
            .find(|profile| name_key(&profile.name) == key)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|profile| profile.name.clone())
            .collect()
    }

    /// Profiles that can locate a target pod on their own.
    pub fn interactive_profiles(&self) -> Vec<&Profile> {
        self.profiles
            .iter()
            .filter(|profile| !profile.match_labels.is_empty())
            .collect()
    }

    /// Checks what loading cannot: overlay files and the kubectl binary.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for profile in &self.profiles {
            if let ProfileSource::File(path) = &profile.source
                && let Err(error) = resolver::read_overlay(&profile.name, path)
            {
                errors.push(ValidationError::Overlay(error));
            }
        }

        let invoked_as = attach::invoked_as();
        if let Err(error) = attach::resolve_tool_path(self.tool_path(), invoked_as.as_deref()) {
            errors.push(ValidationError::ToolPath(error));
        }

        errors
    }
}

fn structural_errors(specs: &[ProfileSpec]) -> Vec<ValidationError> {
    specs
        .iter()
        .filter_map(|spec| {
            if spec.name.trim().is_empty() {
                Some(ValidationError::MissingName {
                    source_spec: spec.profile.clone(),
                })
            } else if spec.profile.trim().is_empty() {
                Some(ValidationError::MissingSource {
                    name: spec.name.clone(),
                })
            } else {
                None
            }
        })
        .collect()
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn expand_home(raw: &str) -> PathBuf {
    let rest = raw
        .strip_prefix("~/")
        .or_else(|| raw.strip_prefix("$HOME/"));
    if let Some(rest) = rest
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(raw)
}
