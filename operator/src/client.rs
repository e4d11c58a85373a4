use std::fmt::Debug;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::PostParams,
    runtime::{
        WatchStreamExt,
        watcher::{self, watcher},
    },
};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::{crd::Foo, error::Error};

const WATCH_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Applied(K),
    Deleted(K),
}

pub type WatchItem<K> = Result<WatchEvent<K>, Error>;

/// Stops the producer behind a [`Watch`]. Dropping it has the same effect.
#[derive(Debug)]
pub struct StopHandle(oneshot::Sender<()>);

impl StopHandle {
    pub fn stop(self) {
        let _ = self.0.send(());
    }
}

/// A running watch: the event receiver closes after the producer observes
/// its stop signal.
#[derive(Debug)]
pub struct Watch<K> {
    pub events: mpsc::Receiver<WatchItem<K>>,
    pub stop: StopHandle,
}

impl<K> Watch<K> {
    /// Producer side: where to send events, and the signal to watch for.
    pub fn channel(buffer: usize) -> (Self, mpsc::Sender<WatchItem<K>>, oneshot::Receiver<()>) {
        let (tx, rx) = mpsc::channel(buffer);
        let (stop_tx, stop_rx) = oneshot::channel();
        let watch = Watch {
            events: rx,
            stop: StopHandle(stop_tx),
        };
        (watch, tx, stop_rx)
    }
}

/// Cluster operations the controller depends on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Create a CRD. An existing one yields a 409 error.
    async fn create_crd(&self, crd: &CustomResourceDefinition) -> Result<(), Error>;

    fn watch_crd(&self, name: &str) -> Watch<CustomResourceDefinition>;

    fn watch_foos(&self) -> Watch<Foo>;

    fn watch_deployments(&self) -> Watch<Deployment>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Replace a Deployment; rejected if its resourceVersion is stale.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error>;
}

/// [`ResourceClient`] backed by a kube [`Client`].
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    namespace: Option<String>,
}

impl KubeResourceClient {
    /// Watch `namespace`, or every namespace when `None`.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn scoped<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn deployments_in(&self, deployment: &Deployment) -> Api<Deployment> {
        let ns = deployment
            .namespace()
            .or_else(|| self.namespace.clone())
            .unwrap_or_else(|| "default".into());
        Api::namespaced(self.client.clone(), &ns)
    }
}

fn spawn_watch<K>(api: Api<K>, config: watcher::Config) -> Watch<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (watch, tx, mut stop) = Watch::channel(WATCH_BUFFER);
    tokio::spawn(async move {
        let mut stream = watcher(api, config).default_backoff().boxed();
        loop {
            let next = tokio::select! {
                _ = &mut stop => break,
                next = stream.next() => next,
            };
            let item = match next {
                Some(Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj))) => {
                    Ok(WatchEvent::Applied(obj))
                }
                Some(Ok(watcher::Event::Delete(obj))) => Ok(WatchEvent::Deleted(obj)),
                Some(Ok(watcher::Event::Init | watcher::Event::InitDone)) => continue,
                Some(Err(err)) if is_recoverable(&err) => {
                    warn!(error = %err, "watch interrupted, resuming");
                    continue;
                }
                Some(Err(err)) => Err(Error::from(err)),
                None => break,
            };
            if tx.send(item).await.is_err() {
                break;
            }
        }
        debug!("watch producer finished");
    });
    watch
}

/// Errors after which the watcher relists or reconnects on its own.
///
/// An expired resource version (410) and dropped connections fall in this
/// group. Failed list or watch requests and any 403 do not.
fn is_recoverable(err: &watcher::Error) -> bool {
    match err {
        watcher::Error::WatchError(resp) => resp.code == 410,
        watcher::Error::WatchFailed(kube::Error::Api(resp)) => resp.code != 403,
        watcher::Error::WatchFailed(_) => true,
        _ => false,
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create_crd(&self, crd: &CustomResourceDefinition) -> Result<(), Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        api.create(&PostParams::default(), crd).await?;
        Ok(())
    }

    fn watch_crd(&self, name: &str) -> Watch<CustomResourceDefinition> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        spawn_watch(api, config)
    }

    fn watch_foos(&self) -> Watch<Foo> {
        spawn_watch(self.scoped::<Foo>(), watcher::Config::default())
    }

    fn watch_deployments(&self) -> Watch<Deployment> {
        spawn_watch(self.scoped::<Deployment>(), watcher::Config::default())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        self.deployments_in(deployment)
            .create(&PostParams::default(), deployment)
            .await?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        self.deployments_in(deployment)
            .replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?;
        Ok(())
    }
}

/// An idle watch whose channel closes once it is stopped.
#[cfg(test)]
pub(crate) fn stoppable<K: Send + 'static>() -> Watch<K> {
    let (watch, tx, stop) = Watch::channel(1);
    tokio::spawn(async move {
        let _ = stop.await;
        drop(tx);
    });
    watch
}
