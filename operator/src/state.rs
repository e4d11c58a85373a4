use std::collections::{HashMap, HashSet};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;

use crate::{client::WatchEvent, crd::Foo};

/// In-memory view of both watched kinds plus the Foos awaiting a sync.
///
/// Owned by the reactor task alone.
#[derive(Debug, Default)]
pub struct ReconcileState {
    pub foos: HashMap<ObjectRef<Foo>, Foo>,
    pub deployments: HashMap<ObjectRef<Deployment>, Deployment>,
    pub dirty: HashSet<ObjectRef<Foo>>,
}

pub(crate) fn object_ref<K>(name: &str, namespace: Option<&str>) -> ObjectRef<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    let obj = ObjectRef::new(name);
    match namespace {
        Some(ns) => obj.within(ns),
        None => obj,
    }
}

/// The Foo controller reference of a Deployment, if any.
pub fn foo_controller(deployment: &Deployment) -> Option<&OwnerReference> {
    deployment.owner_references().iter().find(|owner| {
        owner.controller == Some(true)
            && owner.kind == Foo::kind(&())
            && owner.api_version == Foo::api_version(&())
    })
}

impl ReconcileState {
    /// Record a Foo event and mark the Foo dirty.
    pub fn apply_foo(&mut self, event: WatchEvent<Foo>) -> ObjectRef<Foo> {
        let key = match event {
            WatchEvent::Applied(foo) => {
                let key = ObjectRef::from_obj(&foo);
                self.foos.insert(key.clone(), foo);
                key
            }
            WatchEvent::Deleted(foo) => {
                let key = ObjectRef::from_obj(&foo);
                self.foos.remove(&key);
                key
            }
        };
        self.dirty.insert(key.clone());
        key
    }

    /// Record a Deployment event. Marks and returns the controlling Foo, if
    /// the Deployment has one.
    pub fn apply_deployment(&mut self, event: WatchEvent<Deployment>) -> Option<ObjectRef<Foo>> {
        let (deployment, deleted) = match event {
            WatchEvent::Applied(d) => (d, false),
            WatchEvent::Deleted(d) => (d, true),
        };
        let ns = deployment.namespace();
        let owner = foo_controller(&deployment)
            .map(|owner| object_ref::<Foo>(&owner.name, ns.as_deref()));

        let key = ObjectRef::from_obj(&deployment);
        if deleted {
            self.deployments.remove(&key);
        } else {
            self.deployments.insert(key, deployment);
        }

        if let Some(owner) = &owner {
            self.dirty.insert(owner.clone());
        }
        owner
    }

    /// Where `foo`'s Deployment lives.
    pub fn target_of(foo: &Foo) -> ObjectRef<Deployment> {
        object_ref(&foo.spec.deployment_name, foo.namespace().as_deref())
    }
}
