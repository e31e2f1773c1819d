//! Read-only Kubernetes REST client built on `ureq`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::application::services::ClusterApi;
use crate::domain::{ClusterError, ResourceKind, ResourceRecord};

/// Mount point of the pod's service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Items requested per list page.
pub const PAGE_SIZE: usize = 500;

/// Address `kubectl proxy` listens on by default.
pub const KUBECTL_PROXY_URL: &str = "http://127.0.0.1:8001";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    metadata: ListMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ListMeta {
    #[serde(rename = "continue", default)]
    continue_token: Option<String>,
}

/// TLS material for the API server connection.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub ca_cert_path: Option<PathBuf>,
    pub accept_invalid_certs: bool,
}

pub struct KubeApiClient {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl KubeApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, tls: &TlsOptions) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut builder = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT);
        if base_url.starts_with("https://") {
            builder = builder.tls_connector(Arc::new(tls_connector(tls)?));
        }

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            agent: builder.build(),
        })
    }

    /// True when the process runs in a pod with a mounted service account.
    pub fn is_in_cluster() -> bool {
        std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
            && Path::new(SERVICE_ACCOUNT_DIR).join("token").exists()
    }

    /// Client authenticated with the pod's service-account token and cluster CA.
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .context("KUBERNETES_SERVICE_HOST is not set; not running inside a cluster")?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = fs::read_to_string(dir.join("token"))
            .context("failed to read service-account token")?;
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        Self::new(
            format!("https://{host}:{port}"),
            Some(token.trim().to_string()),
            &TlsOptions {
                ca_cert_path: Some(dir.join("ca.crt")),
                accept_invalid_certs: false,
            },
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_url(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        continue_token: Option<&str>,
    ) -> String {
        let mut url = match namespace.filter(|_| kind.is_namespaced()) {
            Some(ns) => format!(
                "{}{}/namespaces/{}/{}",
                self.base_url,
                kind.api_prefix(),
                urlencoding::encode(ns),
                kind.plural()
            ),
            None => format!("{}{}/{}", self.base_url, kind.api_prefix(), kind.plural()),
        };
        url.push_str(&format!("?limit={PAGE_SIZE}"));
        if let Some(token) = continue_token {
            url.push_str(&format!("&continue={}", urlencoding::encode(token)));
        }
        url
    }

    fn fetch_page(&self, url: &str) -> Result<ListPage, ClusterError> {
        let mut request = self.agent.get(url).set("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let response = request.call().map_err(map_http_error)?;
        response
            .into_json::<ListPage>()
            .map_err(|err| ClusterError::malformed(format!("{url}: {err}")))
    }
}

impl ClusterApi for KubeApiClient {
    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceRecord>, ClusterError> {
        let mut records = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let url = self.list_url(kind, namespace, continue_token.as_deref());
            let page = self.fetch_page(&url)?;
            records.extend(page.items.into_iter().map(ResourceRecord::new));

            match page.metadata.continue_token.filter(|t| !t.is_empty()) {
                Some(next) => continue_token = Some(next),
                None => break,
            }
        }
        debug!(target: "kubequery::cluster", kind = %kind, count = records.len(), "listed");
        Ok(records)
    }
}

fn tls_connector(options: &TlsOptions) -> Result<native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(path) = &options.ca_cert_path {
        let pem = fs::read(path)
            .with_context(|| format!("failed to read CA certificate {}", path.display()))?;
        let cert = native_tls::Certificate::from_pem(&pem)
            .with_context(|| format!("invalid CA certificate {}", path.display()))?;
        builder.add_root_certificate(cert);
    }
    builder.danger_accept_invalid_certs(options.accept_invalid_certs);
    builder.build().context("failed to build TLS connector")
}

fn map_http_error(error: ureq::Error) -> ClusterError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            classify_status(code, &body)
        }
        ureq::Error::Transport(transport) => ClusterError::unavailable(transport.to_string()),
    }
}

/// Map an API server status to a cluster error, keeping the `Status` message when present.
pub fn classify_status(code: u16, body: &str) -> ClusterError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|status| status.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {code}"));
    match code {
        401 => ClusterError::unauthorized(message),
        403 => ClusterError::forbidden(message),
        404 => ClusterError::not_found(message),
        _ => ClusterError::unavailable(format!("HTTP {code}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(url: &str) -> KubeApiClient {
        KubeApiClient::new(url, None, &TlsOptions::default()).unwrap()
    }

    #[test]
    fn test_list_urls() {
        let client = client("http://127.0.0.1:8001/");

        assert_eq!(
            client.list_url(ResourceKind::Pod, None, None),
            "http://127.0.0.1:8001/api/v1/pods?limit=500"
        );
        assert_eq!(
            client.list_url(ResourceKind::Deployment, Some("shop"), Some("abc/=")),
            "http://127.0.0.1:8001/apis/apps/v1/namespaces/shop/deployments?limit=500&continue=abc%2F%3D"
        );
        assert_eq!(
            client.list_url(ResourceKind::Node, Some("shop"), None),
            "http://127.0.0.1:8001/api/v1/nodes?limit=500"
        );
    }

    #[test]
    fn test_status_classification() {
        let forbidden = r#"{"kind":"Status","message":"secrets is forbidden","code":403}"#;
        assert_eq!(
            classify_status(403, forbidden),
            ClusterError::forbidden("secrets is forbidden")
        );
        assert_eq!(classify_status(401, ""), ClusterError::unauthorized("HTTP 401"));
        assert!(matches!(classify_status(404, ""), ClusterError::NotFound(_)));
        assert!(matches!(
            classify_status(500, "oops"),
            ClusterError::Unavailable(_)
        ));
    }

    #[test]
    fn test_follows_continue_tokens() {
        let mut server = Server::new();
        let first = server
            .mock("GET", "/api/v1/namespaces/shop/pods")
            .match_query(Matcher::Exact("limit=500".into()))
            .match_header("authorization", "Bearer sa-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "kind": "PodList",
                    "metadata": {"continue": "page-2"},
                    "items": [{"metadata": {"name": "a", "namespace": "shop"}}]
                })
                .to_string(),
            )
            .create();
        let second = server
            .mock("GET", "/api/v1/namespaces/shop/pods")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "500".into()),
                Matcher::UrlEncoded("continue".into(), "page-2".into()),
            ]))
            .match_header("authorization", "Bearer sa-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "kind": "PodList",
                    "metadata": {},
                    "items": [{"metadata": {"name": "b", "namespace": "shop"}}]
                })
                .to_string(),
            )
            .create();
        let client = KubeApiClient::new(
            server.url(),
            Some("sa-token".into()),
            &TlsOptions::default(),
        )
        .unwrap();

        let records = client.list(ResourceKind::Pod, Some("shop")).unwrap();

        let names: Vec<_> = records.iter().filter_map(ResourceRecord::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        first.assert();
        second.assert();
    }

    #[test]
    fn test_forbidden_kind_is_reported() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/v1/secrets")
            .match_query(Matcher::UrlEncoded("limit".into(), "500".into()))
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(json!({"kind": "Status", "message": "secrets is forbidden"}).to_string())
            .create();

        let err = client(&server.url())
            .list(ResourceKind::Secret, None)
            .unwrap_err();

        assert_eq!(err, ClusterError::forbidden("secrets is forbidden"));
        mock.assert();
    }

    #[test]
    fn test_undecodable_body_is_malformed() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/v1/nodes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>proxy error</html>")
            .create();

        let err = client(&server.url()).list(ResourceKind::Node, None).unwrap_err();

        assert!(matches!(err, ClusterError::Malformed(_)));
        mock.assert();
    }
}
