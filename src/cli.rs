use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubectl-dpm",
    version,
    about = "Attach pre-configured debug containers to running pods."
)]
pub struct CliArgs {
    /// Profile configuration file (defaults to DPM_CONFIG or debug-profiles.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// tracing filter (for example: warn,info,debug)
    #[arg(long, global = true, default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Inject a debug container into a pod and attach to it
    Run(RunArgs),
    /// List the configured debug profiles
    List(ListArgs),
    /// Check every profile and the kubectl binary
    Validate,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Target pod; when omitted the profile's matchLabels select it
    pub pods: Vec<String>,

    /// Debug profile to use; opens a picker when omitted
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Container image, overriding the profile's image
    #[arg(long)]
    pub image: Option<String>,

    /// Name for the debug container
    #[arg(short = 'c', long = "container")]
    pub container: Option<String>,

    /// Namespace of the target pod
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Give up waiting for the container after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Also show image, namespace and match labels
    #[arg(short, long)]
    pub wide: bool,
}

#[cfg(test)]
mod tests {
    use super::{CliArgs, Command};
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn run_accepts_pod_and_overrides() {
        let args = CliArgs::parse_from([
            "kubectl-dpm",
            "--config",
            "profiles.yaml",
            "run",
            "web-1",
            "-p",
            "net",
            "--image",
            "busybox",
            "-n",
            "team-a",
            "--timeout",
            "30",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("profiles.yaml")));
        assert_eq!(args.log_filter, "warn");
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.pods, vec!["web-1"]);
        assert_eq!(run.profile.as_deref(), Some("net"));
        assert_eq!(run.image.as_deref(), Some("busybox"));
        assert_eq!(run.namespace.as_deref(), Some("team-a"));
        assert_eq!(run.timeout, Some(30));
        assert!(!run.quiet);
    }

    #[test]
    fn list_wide_flag() {
        let args = CliArgs::parse_from(["kubectl-dpm", "list", "-w"]);
        assert!(matches!(args.command, Command::List(list) if list.wide));
    }
}
