use std::fmt::Display;

use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, info, warn};

use crate::{
    client::ResourceClient,
    crd::Foo,
    deployment::build_deployment,
    error::Error,
    state::{ReconcileState, foo_controller},
};

/// What one synchronization pass did with a dirty Foo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The Foo is gone; the garbage collector owns cleanup.
    Dropped,
    Converged,
    /// The target Deployment is controlled by something else.
    Conflict,
    Created,
    Updated,
}

impl Outcome {
    fn settled(self) -> bool {
        self != Outcome::Conflict
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Dropped => write!(f, "dropped"),
            Outcome::Converged => write!(f, "converged"),
            Outcome::Conflict => write!(f, "conflict"),
            Outcome::Created => write!(f, "created"),
            Outcome::Updated => write!(f, "updated"),
        }
    }
}

/// Drive every dirty Foo toward its Deployment.
///
/// Stops at the first failed API call and returns it; that Foo and every
/// one not yet visited stay dirty for the next tick. Conflicts stay dirty
/// too, without failing the pass.
///
/// Changing `deploymentName` after the fact creates a second Deployment and
/// leaves the first one behind.
pub async fn synchronize<C>(client: &C, state: &mut ReconcileState) -> Result<(), Error>
where
    C: ResourceClient + ?Sized,
{
    let pending: Vec<ObjectRef<Foo>> = state.dirty.iter().cloned().collect();
    debug!(pending = pending.len(), "synchronizing");

    for key in pending {
        let outcome = reconcile_one(client, state, &key).await?;
        if outcome.settled() {
            state.dirty.remove(&key);
        }
    }
    Ok(())
}

async fn reconcile_one<C>(
    client: &C,
    state: &ReconcileState,
    key: &ObjectRef<Foo>,
) -> Result<Outcome, Error>
where
    C: ResourceClient + ?Sized,
{
    let Some(foo) = state.foos.get(key) else {
        debug!(foo = %key, "Foo no longer exists, nothing to do");
        return Ok(Outcome::Dropped);
    };

    let target = ReconcileState::target_of(foo);
    let existing = state.deployments.get(&target);

    if let Some(current) = existing {
        let owned = foo_controller(current).is_some_and(|owner| owner.name == foo.name_any());
        if !owned {
            warn!(
                foo = %key,
                deployment = %target,
                "Deployment is not controlled by this Foo, leaving it alone"
            );
            return Ok(Outcome::Conflict);
        }
        let replicas = current.spec.as_ref().and_then(|s| s.replicas);
        if replicas == Some(foo.spec.replicas) {
            return Ok(Outcome::Converged);
        }
    }

    let mut desired = build_deployment(foo);
    let outcome = match existing {
        Some(current) => {
            desired.metadata.resource_version = current.resource_version();
            client.update_deployment(&desired).await?;
            Outcome::Updated
        }
        None => {
            client.create_deployment(&desired).await?;
            Outcome::Created
        }
    };
    info!(
        foo = %key,
        deployment = %target,
        replicas = foo.spec.replicas,
        "{} Deployment",
        outcome
    );
    Ok(outcome)
}
