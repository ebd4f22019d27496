//! HTTP registry client
//!
//! REST layout under `{endpoint}/api/v1`:
//!
//! | operation              | request                                                  |
//! |------------------------|----------------------------------------------------------|
//! | list packages          | `GET packages?username=&organization=`                   |
//! | package metadata       | `GET packages/{ns}/{name}`                               |
//! | pull blob              | `GET packages/{ns}/{name}/pull?version=`                 |
//! | push                   | `POST packages/{ns}/{name}?force=` `{name,version,blob}` |
//! | delete                 | `DELETE packages/{ns}/{name}?version=`                   |
//! | list / create channels | `GET`/`POST packages/{ns}/{name}/channels`               |
//! | show channel           | `GET packages/{ns}/{name}/channels/{channel}`            |
//! | add / remove release   | `POST`/`DELETE .../channels/{channel}/{version}`         |
//! | API version            | `GET version` `{"kpm-api": "..."}`                       |

use async_trait::async_trait;
use base64::Engine as _;
use kpm_core::PackageName;
use reqwest::{Client, RequestBuilder, StatusCode};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{RegistryError, Result};
use crate::registry::{Channel, PackageFilter, PackageSummary, Registry};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct PushRequest {
    name: String,
    version: String,
    blob: String,
}

#[derive(Serialize)]
struct CreateChannelRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct VersionResponse {
    #[serde(rename = "kpm-api")]
    api: String,
}

/// Registry client speaking the kpm REST API
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    endpoint: String,
    base_url: String,
}

impl HttpRegistry {
    /// Create a client for `endpoint` (e.g. `https://registry.example.com`)
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(endpoint).map_err(|e| RegistryError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl {
                url: endpoint.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kpm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Network {
                message: e.to_string(),
            })?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url: format!("{}/api/v1", endpoint),
            endpoint,
        })
    }

    fn package_url(&self, name: &PackageName) -> String {
        format!(
            "{}/packages/{}/{}",
            self.base_url,
            name.namespace(),
            name.name()
        )
    }

    fn channel_url(&self, name: &PackageName, channel: &str) -> String {
        format!("{}/channels/{}", self.package_url(name), channel)
    }

    async fn send(&self, request: RequestBuilder, what: impl Fn() -> String) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "registry request failed: {}", body);
        Err(match status {
            StatusCode::NOT_FOUND => RegistryError::not_found(what()),
            StatusCode::CONFLICT => RegistryError::Conflict {
                message: if body.is_empty() {
                    format!("{} already exists", what())
                } else {
                    body
                },
            },
            _ => RegistryError::Http {
                status: status.as_u16(),
                message: body,
            },
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: impl Fn() -> String,
    ) -> Result<T> {
        let response = self.send(request, what).await?;
        Ok(response.json().await?)
    }

    /// Package metadata (`default` and `versions`)
    pub async fn package(&self, name: &PackageName) -> Result<PackageSummary> {
        self.json(self.client.get(self.package_url(name)), || {
            format!("package {}", name)
        })
        .await
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn api_version(&self) -> Result<String> {
        let response: VersionResponse = self
            .json(self.client.get(format!("{}/version", self.base_url)), || {
                "version endpoint".to_string()
            })
            .await?;
        Ok(response.api)
    }

    async fn fetch(&self, name: &PackageName, version: Option<&Version>) -> Result<Vec<u8>> {
        let mut request = self.client.get(format!("{}/pull", self.package_url(name)));
        if let Some(v) = version {
            request = request.query(&[("version", v.to_string())]);
        }
        tracing::debug!(package = %name, "pulling from {}", self.endpoint);

        let response = self
            .send(request, || match version {
                Some(v) => format!("package {}@{}", name, v),
                None => format!("package {}", name),
            })
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn latest_version(&self, name: &PackageName) -> Result<Option<Version>> {
        Ok(self.package(name).await?.default)
    }

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<PackageSummary>> {
        let mut query = Vec::new();
        if let Some(user) = &filter.user {
            query.push(("username", user.as_str()));
        }
        if let Some(org) = &filter.organization {
            query.push(("organization", org.as_str()));
        }
        let request = self
            .client
            .get(format!("{}/packages", self.base_url))
            .query(&query);
        self.json(request, || "packages".to_string()).await
    }

    async fn push(
        &self,
        name: &PackageName,
        version: &Version,
        blob: &[u8],
        force: bool,
    ) -> Result<()> {
        let body = PushRequest {
            name: name.to_string(),
            version: version.to_string(),
            blob: base64::engine::general_purpose::STANDARD.encode(blob),
        };
        let request = self
            .client
            .post(self.package_url(name))
            .query(&[("force", force)])
            .json(&body);
        self.send(request, || format!("package {}@{}", name, version))
            .await?;
        tracing::info!(package = %name, %version, "pushed to {}", self.endpoint);
        Ok(())
    }

    async fn delete_package(&self, name: &PackageName, version: Option<&Version>) -> Result<()> {
        let mut request = self.client.delete(self.package_url(name));
        if let Some(v) = version {
            request = request.query(&[("version", v.to_string())]);
        }
        self.send(request, || format!("package {}", name)).await?;
        Ok(())
    }

    async fn create_channel(&self, package: &PackageName, channel: &str) -> Result<Channel> {
        let request = self
            .client
            .post(format!("{}/channels", self.package_url(package)))
            .json(&CreateChannelRequest { name: channel });
        self.json(request, || format!("channel {}/{}", package, channel))
            .await
    }

    async fn list_channels(&self, package: &PackageName) -> Result<Vec<Channel>> {
        let request = self
            .client
            .get(format!("{}/channels", self.package_url(package)));
        self.json(request, || format!("package {}", package)).await
    }

    async fn show_channel(&self, package: &PackageName, channel: &str) -> Result<Channel> {
        let request = self.client.get(self.channel_url(package, channel));
        self.json(request, || format!("channel {}/{}", package, channel))
            .await
    }

    async fn add_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel> {
        let request = self
            .client
            .post(format!("{}/{}", self.channel_url(package, channel), version));
        self.json(request, || {
            format!("release {} on channel {}/{}", version, package, channel)
        })
        .await
    }

    async fn remove_channel_release(
        &self,
        package: &PackageName,
        channel: &str,
        version: &Version,
    ) -> Result<Channel> {
        let request = self
            .client
            .delete(format!("{}/{}", self.channel_url(package, channel), version));
        self.json(request, || {
            format!("release {} on channel {}/{}", version, package, channel)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn name() -> PackageName {
        PackageName::parse("acme/web").unwrap()
    }

    async fn registry(server: &MockServer) -> HttpRegistry {
        HttpRegistry::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn channel_json(versions: &[&str]) -> serde_json::Value {
        json!({
            "name": "stable",
            "package": "acme/web",
            "releases": versions
                .iter()
                .map(|v| json!({"version": v, "created_at": "2024-01-01T00:00:00Z"}))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(HttpRegistry::new("not a url", DEFAULT_TIMEOUT).is_err());
        assert!(HttpRegistry::new("ftp://registry", DEFAULT_TIMEOUT).is_err());
        let registry = HttpRegistry::new("https://registry.example.com/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(registry.endpoint(), "https://registry.example.com");
    }

    #[tokio::test]
    async fn test_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kpm-api": "0.21.2"})))
            .mount(&server)
            .await;

        let version = registry(&server).await.api_version().await.unwrap();
        assert_eq!(version, "0.21.2");
    }

    #[tokio::test]
    async fn test_fetch_blob() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/acme/web/pull"))
            .and(query_param("version", "1.2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"blob".to_vec()))
            .mount(&server)
            .await;

        let blob = registry(&server)
            .await
            .fetch(&name(), Some(&Version::new(1, 2, 0)))
            .await
            .unwrap();
        assert_eq!(blob, b"blob");
    }

    #[tokio::test]
    async fn test_not_found_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/acme/web/pull"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = registry(&server).await.fetch(&name(), None).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { ref what } if what == "package acme/web"));
    }

    #[tokio::test]
    async fn test_latest_version_from_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/acme/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "acme/web",
                "default": "1.1.0",
                "versions": ["1.0.0", "1.1.0"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/acme/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "acme/db"})))
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        assert_eq!(
            registry.latest_version(&name()).await.unwrap(),
            Some(Version::new(1, 1, 0))
        );
        let db = PackageName::parse("acme/db").unwrap();
        assert_eq!(registry.latest_version(&db).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_push_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/packages/acme/web"))
            .and(query_param("force", "false"))
            .and(body_partial_json(json!({"name": "acme/web", "version": "1.0.0", "blob": "YmxvYg=="})))
            .respond_with(ResponseTemplate::new(409).set_body_string("version exists"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/packages/acme/web"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        let v = Version::new(1, 0, 0);
        let err = registry.push(&name(), &v, b"blob", false).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { ref message } if message == "version exists"));
        registry.push(&name(), &v, b"blob", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_packages_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages"))
            .and(query_param("organization", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "acme/web", "default": "1.0.0", "versions": ["1.0.0"]}
            ])))
            .mount(&server)
            .await;

        let filter = PackageFilter {
            organization: Some("acme".to_string()),
            ..Default::default()
        };
        let packages = registry(&server).await.list_packages(&filter).await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].versions, vec![Version::new(1, 0, 0)]);
    }

    #[tokio::test]
    async fn test_channel_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/packages/acme/web/channels"))
            .and(body_partial_json(json!({"name": "stable"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(channel_json(&[])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/packages/acme/web/channels/stable/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(channel_json(&["1.0.0"])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/packages/acme/web/channels/stable/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(channel_json(&[])))
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        let v = Version::new(1, 0, 0);
        assert!(registry.create_channel(&name(), "stable").await.unwrap().releases.is_empty());
        let channel = registry.add_channel_release(&name(), "stable", &v).await.unwrap();
        assert_eq!(channel.current(), Some(&v));
        let channel = registry.remove_channel_release(&name(), "stable", &v).await.unwrap();
        assert!(channel.current().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/acme/web/channels/stable"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = registry(&server)
            .await
            .show_channel(&name(), "stable")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
