use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::{
    client::{ResourceClient, Watch, WatchEvent},
    crd::is_established,
    error::Error,
};

/// Create `crd` if needed and wait until the API server reports it
/// Established.
///
/// An already existing CRD counts as success. No watch on Foo instances may
/// start before this returns `Ok`.
pub async fn ensure_crd<C>(client: &C, crd: &CustomResourceDefinition) -> Result<(), Error>
where
    C: ResourceClient + ?Sized,
{
    let name = crd.name_any();

    // TODO: replace an existing CRD whose schema differs instead of keeping it.
    match client.create_crd(crd).await {
        Ok(()) => info!(crd = %name, "created CustomResourceDefinition"),
        Err(err) if err.is_conflict() => {
            debug!(crd = %name, "CustomResourceDefinition already exists")
        }
        Err(err) => return Err(err),
    }

    let Watch { mut events, stop } = client.watch_crd(&name);
    let result = loop {
        match events.recv().await {
            Some(Ok(WatchEvent::Applied(obj))) if is_established(&obj) => break Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(err)) => break Err(err),
            None => break Err(Error::CrdWatchClosed(name.clone())),
        }
    };
    stop.stop();

    if result.is_ok() {
        info!(crd = %name, "CustomResourceDefinition established");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{MockResourceClient, WatchItem},
        crd::Foo,
        error::api_error,
    };
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
    };
    use kube::CustomResourceExt;
    use tokio::sync::{mpsc, oneshot};

    fn established(status: &str) -> CustomResourceDefinition {
        let mut crd = Foo::crd();
        crd.status = Some(CustomResourceDefinitionStatus {
            conditions: Some(vec![CustomResourceDefinitionCondition {
                type_: "Established".into(),
                status: status.into(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        crd
    }

    type Feed = mpsc::Sender<WatchItem<CustomResourceDefinition>>;

    /// A watch preloaded with `items`; it stays open while the feed lives.
    fn scripted(
        items: Vec<WatchItem<CustomResourceDefinition>>,
    ) -> (Watch<CustomResourceDefinition>, Feed, oneshot::Receiver<()>) {
        let (watch, tx, stop) = Watch::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).unwrap();
        }
        (watch, tx, stop)
    }

    fn client_with(
        create: Result<(), Error>,
        watch: Option<Watch<CustomResourceDefinition>>,
    ) -> MockResourceClient {
        let mut client = MockResourceClient::new();
        client.expect_create_crd().times(1).return_once(move |_| create);
        match watch {
            Some(watch) => {
                client
                    .expect_watch_crd()
                    .withf(|name| name == "foos.samplecontroller.example.com")
                    .times(1)
                    .return_once(move |_| watch);
            }
            None => {
                client.expect_watch_crd().never();
            }
        }
        client
    }

    #[tokio::test]
    async fn waits_for_established_then_stops_watch() {
        let (watch, _feed, stop) = scripted(vec![
            Ok(WatchEvent::Applied(Foo::crd())),
            Ok(WatchEvent::Applied(established("False"))),
            Ok(WatchEvent::Applied(established("True"))),
        ]);
        let client = client_with(Ok(()), Some(watch));

        ensure_crd(&client, &Foo::crd()).await.unwrap();
        assert!(stop.await.is_ok());
    }

    #[tokio::test]
    async fn conflict_on_create_is_success() {
        let (watch, _feed, _stop) = scripted(vec![Ok(WatchEvent::Applied(established("True")))]);
        let client = client_with(Err(api_error(409, "AlreadyExists")), Some(watch));

        ensure_crd(&client, &Foo::crd()).await.unwrap();
    }

    #[tokio::test]
    async fn other_create_errors_are_fatal() {
        let client = client_with(Err(api_error(403, "Forbidden")), None);

        let err = ensure_crd(&client, &Foo::crd()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn deleted_events_are_skipped() {
        let (watch, _feed, _stop) = scripted(vec![
            Ok(WatchEvent::Deleted(established("True"))),
            Ok(WatchEvent::Applied(established("True"))),
        ]);
        let client = client_with(Ok(()), Some(watch));

        ensure_crd(&client, &Foo::crd()).await.unwrap();
    }

    #[tokio::test]
    async fn watch_error_is_fatal() {
        let (watch, _feed, _stop) = scripted(vec![Err(api_error(500, "InternalError"))]);
        let client = client_with(Ok(()), Some(watch));

        let err = ensure_crd(&client, &Foo::crd()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn closed_watch_is_not_success() {
        let (watch, tx, _stop) = Watch::channel(1);
        drop(tx);
        let client = client_with(Ok(()), Some(watch));

        let err = ensure_crd(&client, &Foo::crd()).await.unwrap_err();
        assert!(matches!(err, Error::CrdWatchClosed(_)));
    }
}
