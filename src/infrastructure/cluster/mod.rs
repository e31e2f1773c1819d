//! Cluster capability adapters.

mod fixture;
mod kube_api;

pub use fixture::FixtureCluster;
pub use kube_api::{
    classify_status, KubeApiClient, TlsOptions, KUBECTL_PROXY_URL, PAGE_SIZE, SERVICE_ACCOUNT_DIR,
};
