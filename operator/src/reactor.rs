use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ResourceClient, WatchItem},
    crd::Foo,
    error::Error,
    rate_limit::RateLimiter,
    reconcile::synchronize,
    state::ReconcileState,
};

/// One ready source per loop iteration.
enum Input {
    Foo(Option<WatchItem<Foo>>),
    Deployment(Option<WatchItem<Deployment>>),
    Tick,
}

/// Single task that folds both watches into [`ReconcileState`] and runs the
/// synchronizer whenever the limiter says so.
pub struct Reactor<C: ?Sized, R> {
    client: Arc<C>,
    limiter: R,
    state: ReconcileState,
    errors: mpsc::Sender<Error>,
}

impl<C, R> Reactor<C, R>
where
    C: ResourceClient + ?Sized,
    R: RateLimiter,
{
    pub fn new(client: Arc<C>, limiter: R, errors: mpsc::Sender<Error>) -> Self {
        Self {
            client,
            limiter,
            state: ReconcileState::default(),
            errors,
        }
    }

    /// Runs until both watches have closed, or until either of them reports
    /// an error. The error sender is dropped on return, closing the channel.
    pub async fn run(
        mut self,
        mut foos: mpsc::Receiver<WatchItem<Foo>>,
        mut deployments: mpsc::Receiver<WatchItem<Deployment>>,
    ) {
        let mut foos_open = true;
        let mut deployments_open = true;

        while foos_open || deployments_open {
            let input = tokio::select! {
                item = foos.recv(), if foos_open => Input::Foo(item),
                item = deployments.recv(), if deployments_open => Input::Deployment(item),
                () = self.limiter.ready() => Input::Tick,
            };

            match input {
                Input::Foo(Some(Ok(event))) => {
                    let key = self.state.apply_foo(event);
                    debug!(foo = %key, "Foo changed");
                    self.limiter.request_tick();
                }
                Input::Foo(Some(Err(err))) => return self.fail(Error::stream("Foos", err)).await,
                Input::Foo(None) => {
                    info!("Foo watch closed");
                    foos_open = false;
                }
                Input::Deployment(Some(Ok(event))) => {
                    if let Some(owner) = self.state.apply_deployment(event) {
                        debug!(foo = %owner, "owned Deployment changed");
                        self.limiter.request_tick();
                    }
                }
                Input::Deployment(Some(Err(err))) => {
                    return self.fail(Error::stream("Deployments", err)).await;
                }
                Input::Deployment(None) => {
                    info!("Deployment watch closed");
                    deployments_open = false;
                }
                Input::Tick => self.on_tick().await,
            }
        }

        info!("both watches closed, reactor stopped");
    }

    async fn on_tick(&mut self) {
        if let Err(err) = synchronize(&*self.client, &mut self.state).await {
            warn!(
                error = %err,
                dirty = self.state.dirty.len(),
                "synchronize failed, will retry"
            );
            self.limiter.request_tick();
        }
    }

    async fn fail(self, err: Error) {
        error!(error = %err, "watch failed, stopping reactor");
        let _ = self.errors.send(err).await;
    }
}
