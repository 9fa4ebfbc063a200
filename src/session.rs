use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::attach::Attacher;
use crate::error::{AttachError, DebugError, SelectionError, SessionError, WatchError};
use crate::k8s::PodBackend;
use crate::model::{DebugSession, Phase, TargetRef};
use crate::patch::{build_patch, container_name, existing_container_names, random_suffix};
use crate::profile::Catalog;
use crate::resolver::{Overrides, resolve};
use crate::selector::{select_namespace, single_target};
use crate::watch::{WaitOutcome, wait_for_container};

#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub profile: String,
    pub targets: Vec<String>,
    pub overrides: Overrides,
    /// `--namespace` when given, else the kubeconfig context's namespace.
    pub context_namespace: String,
    pub timeout: Option<Duration>,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// The operator attached and later detached.
    Detached(DebugSession),
    /// Interrupted. `None` when the pod was never patched.
    Cancelled(Option<DebugSession>),
}

/// Where the session is, so failures can say which profile and pod they hit.
struct Scope {
    profile: String,
    namespace: Option<String>,
    target: Option<String>,
}

impl Scope {
    fn fail(&self, error: impl Into<DebugError>) -> SessionError {
        SessionError {
            profile: self.profile.clone(),
            namespace: self.namespace.clone(),
            target: self.target.clone(),
            error: error.into(),
        }
    }
}

/// Runs `work` unless `cancel` fires first.
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = work => Some(output),
    }
}

/// Injects the profile's debug container into one pod and attaches to it.
///
/// Nothing is rolled back: once the patch is accepted the container stays in
/// the pod whatever happens afterwards. An interrupt before that point leaves
/// the pod untouched.
pub async fn run_debug_session<B, A>(
    catalog: &Catalog,
    backend: &B,
    attacher: &A,
    request: &SessionRequest,
    cancel: &CancellationToken,
) -> Result<SessionOutcome, SessionError>
where
    B: PodBackend,
    A: Attacher,
{
    let mut scope = Scope {
        profile: request.profile.clone(),
        namespace: None,
        target: None,
    };

    if cancel.is_cancelled() {
        return Ok(SessionOutcome::Cancelled(None));
    }

    let profile =
        resolve(catalog, &request.profile, &request.overrides).map_err(|error| scope.fail(error))?;
    let namespace = select_namespace(profile.namespace.as_deref(), &request.context_namespace);
    scope.namespace = Some(namespace.clone());

    let selected = single_target(backend, &namespace, &request.targets, &profile.match_labels);
    let Some(selected) = unless_cancelled(cancel, selected).await else {
        return Ok(SessionOutcome::Cancelled(None));
    };
    let pod_name = selected.map_err(|error| scope.fail(error))?;
    scope.target = Some(pod_name.clone());
    let target = TargetRef::new(namespace, pod_name);

    let fetching = backend.get_pod(&target.namespace, &target.name);
    let Some(fetched) = unless_cancelled(cancel, fetching).await else {
        return Ok(SessionOutcome::Cancelled(None));
    };
    let pod = fetched
        .map_err(|source| {
            scope.fail(SelectionError::Lookup {
                namespace: target.namespace.clone(),
                source,
            })
        })?
        .ok_or_else(|| {
            scope.fail(SelectionError::PodNotFound {
                namespace: target.namespace.clone(),
                name: target.name.clone(),
            })
        })?;

    let existing = existing_container_names(&pod);
    let name = container_name(profile.container_name.as_deref(), &existing, random_suffix);
    if profile.container_name.is_none() && !request.quiet {
        eprintln!("Defaulting debug container name to {name}.");
    }

    let plan = build_patch(&pod, &profile, &name).map_err(|error| scope.fail(error))?;
    let applying = backend.patch_ephemeral_containers(&target.namespace, &target.name, &plan.patch);
    let Some(applied) = unless_cancelled(cancel, applying).await else {
        debug!(pod = %target, container = %name, "interrupted while adding ephemeral container");
        return Ok(SessionOutcome::Cancelled(None));
    };
    applied.map_err(|error| scope.fail(error))?;
    info!(
        pod = %target,
        container = %name,
        image = %profile.image,
        "ephemeral container added"
    );

    let mut session = DebugSession::new(target, profile, name);
    let events = backend.watch_pod(&session.target.namespace, &session.target.name);
    let quiet = request.quiet;
    let waiting = wait_for_container(
        events,
        &session.target.name,
        &session.container_name,
        cancel,
        |warning| {
            if quiet {
                debug!("{warning}");
            } else {
                eprintln!("{warning}");
            }
        },
    );

    let waited = match request.timeout {
        Some(after) => tokio::time::timeout(after, waiting)
            .await
            .unwrap_or_else(|_| {
                Err(WatchError::TimedOut {
                    container: session.container_name.clone(),
                    after,
                })
            }),
        None => waiting.await,
    };

    let outcome = match waited {
        Ok(outcome) => outcome,
        Err(error) => {
            if matches!(error, WatchError::Gone { .. }) {
                session.phase = Phase::Gone;
            }
            debug!(
                pod = %session.target,
                phase = %session.phase,
                "stopped waiting for debug container"
            );
            return Err(scope.fail(error));
        }
    };

    match outcome {
        WaitOutcome::Cancelled => Ok(SessionOutcome::Cancelled(Some(session))),
        WaitOutcome::Terminated(_) => {
            session.phase = Phase::Terminated;
            debug!(
                pod = %session.target,
                phase = %session.phase,
                "debug container exited before attach"
            );
            Err(scope.fail(AttachError::Terminated {
                container: session.container_name.clone(),
            }))
        }
        WaitOutcome::Running(_) => {
            session.phase = Phase::Running;
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled(Some(session)));
            }
            attacher
                .attach(&session.target, &session.container_name)
                .await
                .map_err(|error| scope.fail(error))?;
            Ok(SessionOutcome::Detached(session))
        }
    }
}
