use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::controller::ControllerOptions;

#[derive(Parser, Debug)]
#[command(name = "sample-controller", version, about = "Keeps Deployments in line with Foo resources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Namespace to watch. All namespaces when unset.
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Minimum time between two synchronization passes.
    #[arg(long, env = "SYNC_MIN_INTERVAL_MS", default_value_t = 500)]
    pub min_sync_interval_ms: u64,

    /// Give up if the CRD is not Established within this many seconds.
    #[arg(long, env = "CRD_ESTABLISH_TIMEOUT_SECS")]
    pub crd_timeout_secs: Option<u64>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Install the CRD and run the controller (default).
    Run,
    /// Print the Foo CRD as YAML.
    Crd,
}

impl Cli {
    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_millis(self.min_sync_interval_ms)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            crd_timeout: self.crd_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["sample-controller"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.min_sync_interval(), Duration::from_millis(500));
        assert!(cli.controller_options().crd_timeout.is_none());
    }

    #[test]
    fn flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "sample-controller",
            "--namespace",
            "team-a",
            "--min-sync-interval-ms",
            "50",
            "--crd-timeout-secs",
            "30",
            "crd",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::Crd));
        assert_eq!(cli.namespace.as_deref(), Some("team-a"));
        assert_eq!(cli.min_sync_interval(), Duration::from_millis(50));
        assert_eq!(
            cli.controller_options().crd_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn rejects_bad_interval() {
        assert!(Cli::try_parse_from(["sample-controller", "--min-sync-interval-ms", "soon"]).is_err());
    }
}
