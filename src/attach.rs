use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{AttachError, ToolPathError};
use crate::model::TargetRef;

const KUBECTL: &str = "kubectl";

/// Connects the operator's terminal to a running container.
pub trait Attacher {
    fn attach(
        &self,
        target: &TargetRef,
        container: &str,
    ) -> impl Future<Output = Result<(), AttachError>> + Send;
}

/// Attaches by running `kubectl attach` with the operator's stdio.
#[derive(Debug, Clone)]
pub struct KubectlAttacher {
    tool: PathBuf,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
    quiet: bool,
}

impl KubectlAttacher {
    pub fn new(
        tool: PathBuf,
        context: Option<String>,
        kubeconfig: Option<PathBuf>,
        quiet: bool,
    ) -> Self {
        Self {
            tool,
            context,
            kubeconfig,
            quiet,
        }
    }

    pub fn command_args(&self, target: &TargetRef, container: &str) -> Vec<OsString> {
        let mut args = ["attach", "-i", "-t", "-n", target.namespace.as_str()]
            .into_iter()
            .map(OsString::from)
            .collect::<Vec<_>>();
        args.push(OsString::from(&target.name));
        args.push(OsString::from("-c"));
        args.push(OsString::from(container));
        if let Some(context) = &self.context {
            args.push(OsString::from("--context"));
            args.push(OsString::from(context));
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(OsString::from("--kubeconfig"));
            args.push(kubeconfig.as_os_str().to_os_string());
        }
        if self.quiet {
            args.push(OsString::from("-q"));
        }
        args
    }
}

impl Attacher for KubectlAttacher {
    async fn attach(&self, target: &TargetRef, container: &str) -> Result<(), AttachError> {
        let args = self.command_args(target, container);
        debug!(tool = %self.tool.display(), ?args, "attaching");

        let status = TokioCommand::new(&self.tool)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| AttachError::Spawn {
                pod: target.name.clone(),
                tool: self.tool.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(AttachError::Exited {
                pod: target.name.clone(),
                container: container.to_string(),
                status,
            })
        }
    }
}

/// The program name the shell recorded when launching us, if any.
pub fn invoked_as() -> Option<String> {
    std::env::var("_").ok()
}

/// Finds the kubectl binary to attach with.
///
/// Running as a kubectl plugin wins, then the configured path, then `PATH`.
pub fn resolve_tool_path(
    configured: Option<&Path>,
    invoked_as: Option<&str>,
) -> Result<PathBuf, ToolPathError> {
    if let Some(invoked_as) = invoked_as.filter(|value| value.ends_with(KUBECTL)) {
        return Ok(PathBuf::from(invoked_as));
    }

    if let Some(configured) = configured {
        return check_executable(configured).map(|()| configured.to_path_buf());
    }

    which::which(KUBECTL).map_err(ToolPathError::NotOnPath)
}

fn check_executable(path: &Path) -> Result<(), ToolPathError> {
    let metadata =
        std::fs::metadata(path).map_err(|_| ToolPathError::Missing(path.to_path_buf()))?;
    if metadata.is_dir() {
        return Err(ToolPathError::Directory(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ToolPathError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}
