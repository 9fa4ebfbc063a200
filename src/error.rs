use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single problem found while validating the profile catalog.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("profile with source {source_spec:?} is missing a profile name")]
    MissingName { source_spec: String },
    #[error("profile {name:?} is missing a profile source (built-in keyword or container spec file)")]
    MissingSource { name: String },
    #[error(transparent)]
    Overlay(#[from] ResolutionError),
    #[error(transparent)]
    ToolPath(#[from] ToolPathError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid profile catalog: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("profile {name:?} not found (known profiles: {})", .known.join(", "))]
    NotFound { name: String, known: Vec<String> },
    #[error("profile {name:?} has no image and no --image override was given")]
    MissingImage { name: String },
    #[error("profile {name:?}: failed to read container spec {}", .path.display())]
    UnreadableOverlay {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile {name:?}: {} does not contain a valid container spec", .path.display())]
    InvalidOverlay {
        name: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("only one target pod can be debugged per invocation, got {}: {}", .names.len(), .names.join(", "))]
    TooManyTargets { names: Vec<String> },
    #[error("no target pod given and the profile has no matchLabels to select one")]
    NoSelector,
    #[error("no pods in namespace {namespace} found with label selector {selector}")]
    NoMatches { namespace: String, selector: String },
    #[error(
        "label selector {selector} matches {} pods in namespace {namespace} ({}), pass the pod name explicitly",
        .names.len(),
        .names.join(", ")
    )]
    Ambiguous {
        namespace: String,
        selector: String,
        names: Vec<String>,
    },
    #[error("pods {name:?} not found in namespace {namespace}")]
    PodNotFound { namespace: String, name: String },
    #[error("failed to look up pods in namespace {namespace}")]
    Lookup {
        namespace: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("error creating JSON for {what}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to decode patched {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to find the {container} ephemeral container in the debug pod")]
    MissingContainer { container: String },
    #[error("custom profile overlay must be a JSON object")]
    OverlayNotObject,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("ephemeral containers are disabled for this cluster (error from server: {message:?})")]
    FeatureDisabled { message: String },
    #[error("pods {name:?} not found in namespace {namespace}")]
    PodNotFound { namespace: String, name: String },
    #[error("error adding ephemeral container")]
    Rejected(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("pods {pod:?} not found")]
    Gone { pod: String },
    #[error("watch for pod {pod} ended before container {container} started")]
    StreamClosed { pod: String, container: String },
    #[error("watch for pod {pod} failed")]
    Stream {
        pod: String,
        #[source]
        source: BoxError,
    },
    #[error("timed out after {}s waiting for container {container} to start", .after.as_secs())]
    TimedOut { container: String, after: Duration },
}

#[derive(Debug, Error)]
pub enum ToolPathError {
    #[error("kubectl {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("kubectl {} is a directory", .0.display())]
    Directory(PathBuf),
    #[error("kubectl {} is not executable", .0.display())]
    NotExecutable(PathBuf),
    #[error("kubectl not found on PATH and no kubectlPath configured")]
    NotOnPath(#[source] which::Error),
}

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("ephemeral container {container:?} terminated")]
    Terminated { container: String },
    #[error("couldn't attach to pod/{pod}: failed to start {}", .tool.display())]
    Spawn {
        pod: String,
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't attach to pod/{pod}: attach exited with {status}, container {container} keeps running")]
    Exited {
        pod: String,
        container: String,
        status: ExitStatus,
    },
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// A failed debug session, carrying where in the session it failed.
#[derive(Debug)]
pub struct SessionError {
    pub profile: String,
    pub namespace: Option<String>,
    pub target: Option<String>,
    pub error: DebugError,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "debug profile {:?}", self.profile)?;
        match (&self.namespace, &self.target) {
            (Some(namespace), Some(target)) => write!(f, ", pod {namespace}/{target}"),
            (Some(namespace), None) => write!(f, ", namespace {namespace}"),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(with_causes)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders one entry followed by its causes.
fn with_causes(error: &ValidationError) -> String {
    let mut rendered = error.to_string();
    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        cause = std::error::Error::source(inner);
    }
    rendered
}
