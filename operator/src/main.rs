mod client;
mod config;
mod controller;
mod crd;
mod deployment;
mod error;
mod install;
mod rate_limit;
mod reactor;
mod reconcile;
mod state;

use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use client::KubeResourceClient;
use config::{Cli, Command};
use controller::Controller;
use crd::Foo;
use rate_limit::TickLimiter;

enum Step {
    Signal(std::io::Result<()>),
    Finished(Option<error::Error>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Crd) => {
            print!("{}", serde_yaml::to_string(&Foo::crd())?);
            Ok(())
        }
        Some(Command::Run) | None => run(&cli).await,
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}, using \"info\"", cli.log_filter);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = Client::try_default().await?;
    let client = Arc::new(KubeResourceClient::new(client, cli.namespace.clone()));
    let limiter = TickLimiter::new(cli.min_sync_interval());

    info!(namespace = ?cli.namespace, "starting Foo controller");
    let mut controller = Controller::start(client, limiter, cli.controller_options());

    let mut stop_requested = false;
    loop {
        let step = tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stop_requested => Step::Signal(signal),
            next = controller.next_error() => Step::Finished(next),
        };
        match step {
            Step::Signal(signal) => {
                if let Err(err) = signal {
                    warn!(error = %err, "could not listen for ctrl-c, stopping");
                }
                info!("shutting down");
                controller.request_stop();
                stop_requested = true;
            }
            Step::Finished(Some(err)) => return Err(err.into()),
            Step::Finished(None) => break,
        }
    }

    info!("controller stopped");
    Ok(())
}
