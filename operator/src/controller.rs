use std::{sync::Arc, time::Duration};

use kube::CustomResourceExt;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::{
    client::{ResourceClient, Watch},
    crd::{Foo, crd_name},
    error::Error,
    install::ensure_crd,
    rate_limit::RateLimiter,
    reactor::Reactor,
};

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Upper bound on waiting for the CRD to become Established.
    pub crd_timeout: Option<Duration>,
}

/// Handle on a running controller.
///
/// The controller is finished once [`Controller::next_error`] returns `None`.
/// An error returned before that is fatal.
pub struct Controller {
    errors: mpsc::Receiver<Error>,
    shutdown: watch::Sender<bool>,
}

impl Controller {
    pub fn start<C, R>(client: Arc<C>, limiter: R, options: ControllerOptions) -> Self
    where
        C: ResourceClient + ?Sized + 'static,
        R: RateLimiter + 'static,
    {
        let (errors_tx, errors) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(run(client, limiter, options, errors_tx, shutdown_rx));
        Self { errors, shutdown }
    }

    /// Stop both watches. The controller winds down once they have closed.
    pub fn request_stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn next_error(&mut self) -> Option<Error> {
        self.errors.recv().await
    }
}

async fn install<C>(client: &C, timeout: Option<Duration>) -> Result<(), Error>
where
    C: ResourceClient + ?Sized,
{
    let crd = Foo::crd();
    match timeout {
        Some(limit) => tokio::time::timeout(limit, ensure_crd(client, &crd))
            .await
            .map_err(|_| Error::CrdTimeout(crd_name()))?,
        None => ensure_crd(client, &crd).await,
    }
}

async fn run<C, R>(
    client: Arc<C>,
    limiter: R,
    options: ControllerOptions,
    errors: mpsc::Sender<Error>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: ResourceClient + ?Sized,
    R: RateLimiter,
{
    if let Err(err) = install(&*client, options.crd_timeout).await {
        error!(error = %err, "could not install CRD");
        let _ = errors.send(Error::Install(Box::new(err))).await;
        return;
    }

    let Watch {
        events: foo_events,
        stop: foo_stop,
    } = client.watch_foos();
    let Watch {
        events: deployment_events,
        stop: deployment_stop,
    } = client.watch_deployments();
    let mut stops = Some((foo_stop, deployment_stop));
    info!("watching Foos and Deployments");

    let reactor = Reactor::new(client, limiter, errors).run(foo_events, deployment_events);
    tokio::pin!(reactor);

    loop {
        let handle_dropped = tokio::select! {
            () = &mut reactor => break,
            changed = shutdown.changed(), if stops.is_some() => changed.is_err(),
        };
        if handle_dropped || *shutdown.borrow_and_update() {
            if let Some((foos, deployments)) = stops.take() {
                info!("stop requested, closing watches");
                foos.stop();
                deployments.stop();
            }
        }
    }
}
