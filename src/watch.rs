use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BoxError, WatchError};
use crate::model::Phase;

/// Pod changes as seen by the session, after list pages have been folded.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// A completed initial list or re-list. `None` means the pod was absent.
    Listed(Option<Pod>),
    Applied(Pod),
    Deleted,
}

#[derive(Debug, Clone)]
pub enum Observation {
    Pending { warning: Option<String> },
    Running(Pod),
    Terminated(Pod),
    Gone,
}

impl Observation {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Pending { .. } => Phase::Pending,
            Self::Running(_) => Phase::Running,
            Self::Terminated(_) => Phase::Terminated,
            Self::Gone => Phase::Gone,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Running(Pod),
    Terminated(Pod),
    Cancelled,
}

pub fn container_status<'a>(pod: &'a Pod, container: &str) -> Option<&'a ContainerStatus> {
    let status = pod.status.as_ref()?;
    status
        .ephemeral_container_statuses
        .iter()
        .chain(status.container_statuses.iter())
        .chain(status.init_container_statuses.iter())
        .flatten()
        .find(|candidate| candidate.name == container)
}

pub fn observe(event: PodEvent, container: &str) -> Observation {
    let pod = match event {
        PodEvent::Listed(Some(pod)) | PodEvent::Applied(pod) => pod,
        PodEvent::Listed(None) | PodEvent::Deleted => return Observation::Gone,
    };

    let Some(state) = container_status(&pod, container).and_then(|status| status.state.as_ref())
    else {
        return Observation::Pending { warning: None };
    };

    if state.running.is_some() {
        return Observation::Running(pod);
    }
    if state.terminated.is_some() {
        return Observation::Terminated(pod);
    }

    let warning = state.waiting.as_ref().and_then(|waiting| {
        let message = waiting.message.as_deref().unwrap_or_default().trim();
        if message.is_empty() {
            return None;
        }
        Some(match waiting.reason.as_deref() {
            Some(reason) if !reason.is_empty() => {
                format!("container {container}: {reason}: {message}")
            }
            _ => format!("container {container}: {message}"),
        })
    });
    Observation::Pending { warning }
}

/// Drives `events` until the container runs, terminates or the pod goes away.
///
/// Cancellation wins over a ready event. Each distinct waiting message is
/// reported once through `on_warning`.
pub async fn wait_for_container<S, F>(
    mut events: S,
    pod: &str,
    container: &str,
    cancel: &CancellationToken,
    mut on_warning: F,
) -> Result<WaitOutcome, WatchError>
where
    S: Stream<Item = Result<PodEvent, BoxError>> + Unpin,
    F: FnMut(&str),
{
    let mut last_warning = None::<String>;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            next = events.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(source)) => {
                return Err(WatchError::Stream {
                    pod: pod.to_string(),
                    source,
                });
            }
            None => {
                return Err(WatchError::StreamClosed {
                    pod: pod.to_string(),
                    container: container.to_string(),
                });
            }
        };

        let observation = observe(event, container);
        debug!(pod, container, phase = ?observation.phase(), "pod event");
        match observation {
            Observation::Running(pod) => return Ok(WaitOutcome::Running(pod)),
            Observation::Terminated(pod) => return Ok(WaitOutcome::Terminated(pod)),
            Observation::Gone => {
                return Err(WatchError::Gone {
                    pod: pod.to_string(),
                });
            }
            Observation::Pending {
                warning: Some(warning),
            } if last_warning.as_deref() != Some(warning.as_str()) => {
                on_warning(&warning);
                last_warning = Some(warning);
            }
            Observation::Pending { .. } => {}
        }
    }
}
