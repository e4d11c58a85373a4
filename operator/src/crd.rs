use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "samplecontroller.example.com";
pub const PLURAL: &str = "foos";

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "samplecontroller.example.com",
    version = "v1alpha1",
    kind = "Foo",
    plural = "foos",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
pub struct FooSpec {
    /// Name of the Deployment this Foo drives.
    pub deployment_name: String,
    pub replicas: i32,
}

/// Name of the `CustomResourceDefinition` object for `Foo`.
pub fn crd_name() -> String {
    format!("{PLURAL}.{GROUP}")
}

/// True once the API server reports the `Established` condition.
pub fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
        .unwrap_or(false)
}
