use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{Container, PodSpec, PodTemplateSpec},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::crd::Foo;

pub const CONTROLLER_LABEL: &str = "controller";

const PLACEHOLDER_CONTAINER: &str = "nginx";
const PLACEHOLDER_IMAGE: &str = "nginx:latest";

fn owner_ref(foo: &Foo) -> OwnerReference {
    OwnerReference {
        api_version: Foo::api_version(&()).into_owned(),
        kind: Foo::kind(&()).into_owned(),
        name: foo.name_any(),
        uid: foo.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Deployment that `foo` asks for.
///
/// Used both for creation and as the full replacement body on update; the
/// caller copies the live object's resourceVersion in before replacing.
pub fn build_deployment(foo: &Foo) -> Deployment {
    let foo_name = foo.name_any();

    let mut labels = BTreeMap::new();
    labels.insert(CONTROLLER_LABEL.to_string(), foo_name);

    let container = Container {
        name: PLACEHOLDER_CONTAINER.into(),
        image: Some(PLACEHOLDER_IMAGE.into()),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(foo.spec.deployment_name.clone()),
            namespace: foo.namespace(),
            owner_references: Some(vec![owner_ref(foo)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(foo.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) fn test_foo(ns: &str, name: &str, deployment_name: &str, replicas: i32) -> Foo {
    let mut foo = Foo::new(
        name,
        crate::crd::FooSpec {
            deployment_name: deployment_name.into(),
            replicas,
        },
    );
    foo.metadata.namespace = Some(ns.into());
    foo.metadata.uid = Some(format!("uid-{name}"));
    foo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_deployment_owned_by_foo() {
        let foo = test_foo("default", "x", "d1", 3);
        let deploy = build_deployment(&foo);

        assert_eq!(deploy.name_any(), "d1");
        assert_eq!(deploy.namespace().as_deref(), Some("default"));
        assert_eq!(deploy.resource_version(), None);

        let owners = deploy.owner_references();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Foo");
        assert_eq!(owners[0].api_version, "samplecontroller.example.com/v1alpha1");
        assert_eq!(owners[0].name, "x");
        assert_eq!(owners[0].uid, "uid-x");
        assert_eq!(owners[0].controller, Some(true));

        let spec = deploy.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        let expected = BTreeMap::from([("controller".to_string(), "x".to_string())]);
        assert_eq!(spec.selector.match_labels.as_ref(), Some(&expected));
        assert_eq!(
            spec.template.metadata.and_then(|m| m.labels).as_ref(),
            Some(&expected)
        );
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].image.as_deref(), Some("nginx:latest"));
    }

    #[test]
    fn build_is_deterministic() {
        let foo = test_foo("ns1", "x", "d1", 5);
        assert_eq!(build_deployment(&foo), build_deployment(&foo));
    }

    #[test]
    fn missing_uid_still_builds() {
        let mut foo = test_foo("default", "x", "d1", 1);
        foo.metadata.uid = None;
        let deploy = build_deployment(&foo);
        assert_eq!(deploy.owner_references()[0].uid, "");
    }
}
