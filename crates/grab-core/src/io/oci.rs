//! Minimal OCI registry client.
//!
//! Just enough of the distribution API to pull a single file published as a
//! layer: anonymous token exchange, manifest fetch, layer lookup by the
//! `org.opencontainers.image.title` annotation and blob streaming.

use std::collections::HashMap;

use reqwest::header::{ACCEPT, AUTHORIZATION, RANGE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use grab_schema::OCI_PREFIX;

/// Registry used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Namespace prepended to single-segment repositories on the default registry.
pub const DEFAULT_NAMESPACE: &str = "library/";

/// Media type requested for manifests.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Annotation naming the file a layer carries.
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Errors produced by the registry client.
#[derive(thiserror::Error, Debug)]
pub enum OciError {
    /// The reference cannot be split into registry, repository and tag.
    #[error("Invalid OCI reference '{0}'")]
    InvalidReference(String),

    /// Token exchange failed.
    #[error("Registry authentication failed: {0}")]
    Auth(String),

    /// The manifest could not be fetched or decoded.
    #[error("Failed to fetch manifest: {0}")]
    Manifest(String),

    /// No layer carries the expected title.
    #[error("No layer titled '{name}' in {reference}")]
    LayerNotFound {
        /// Image reference searched.
        reference: String,
        /// File name looked for.
        name: String,
    },

    /// Transport failure.
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A parsed `registry/repository:tag` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host, with port when given.
    pub registry: String,
    /// Repository path within the registry.
    pub repository: String,
    /// Tag or digest.
    pub tag: String,
}

impl ImageRef {
    /// Parse a reference, with or without the `oci://` prefix.
    ///
    /// The tag is split off at the last colon that is not part of a host
    /// port; a missing tag means `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::InvalidReference`] for empty components.
    pub fn parse(reference: &str) -> Result<Self, OciError> {
        let invalid = || OciError::InvalidReference(reference.to_string());
        let raw = reference.strip_prefix(OCI_PREFIX).unwrap_or(reference);

        let (image, tag) = match raw.rsplit_once(':') {
            Some((image, tag)) if !tag.contains('/') => (image, tag),
            _ => (raw, "latest"),
        };
        if image.is_empty() || tag.is_empty() {
            return Err(invalid());
        }

        let (registry, repository) = match image.split_once('/') {
            Some((host, rest)) if is_registry_host(host) => (host.to_string(), rest.to_string()),
            _ if image.contains('/') => (DEFAULT_REGISTRY.to_string(), image.to_string()),
            _ => (
                DEFAULT_REGISTRY.to_string(),
                format!("{DEFAULT_NAMESPACE}{image}"),
            ),
        };
        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid());
        }

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// One layer of an image manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    /// Content digest (`sha256:...`).
    pub digest: String,
    /// Blob size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Free-form annotations.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Layer {
    /// The file name this layer carries, if annotated.
    pub fn title(&self) -> Option<&str> {
        self.annotations.get(TITLE_ANNOTATION).map(String::as_str)
    }
}

/// The subset of an OCI image manifest grab reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Layers in manifest order.
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Manifest {
    /// Find the binary layer for `file_name` and its optional `.sig` sibling.
    ///
    /// A layer matches when its title equals `file_name` or `file_name`
    /// without its extension.
    pub fn find(&self, file_name: &str) -> (Option<&Layer>, Option<&Layer>) {
        let stem = file_name
            .rsplit_once('.')
            .map_or(file_name, |(stem, _)| stem);
        let mut names = vec![file_name];
        if stem != file_name && !stem.is_empty() {
            names.push(stem);
        }

        let by_title = |wanted: &dyn Fn(&str) -> bool| {
            self.layers
                .iter()
                .find(|l| l.title().is_some_and(|t| wanted(t)))
        };
        let binary = by_title(&|t| names.contains(&t));
        let signature = by_title(&|t| {
            t.strip_suffix(".sig")
                .is_some_and(|base| names.contains(&base))
        });
        (binary, signature)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// A binary layer located in a manifest, ready to stream.
#[derive(Debug, Clone)]
pub struct ResolvedLayer {
    /// Image the layers belong to.
    pub image: ImageRef,
    /// Bearer token for blob requests.
    pub token: String,
    /// The binary.
    pub blob: Layer,
    /// Detached signature, when published.
    pub signature: Option<Layer>,
}

/// Registry client over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct OciClient {
    client: Client,
    plain_http: bool,
}

impl OciClient {
    /// Client speaking HTTPS to registries.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            plain_http: false,
        }
    }

    /// Speak plain HTTP, for local registries.
    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    fn base(&self, image: &ImageRef) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{scheme}://{}", image.registry)
    }

    /// Obtain an anonymous pull token.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::Auth`] when the exchange fails.
    pub async fn token(&self, image: &ImageRef) -> Result<String, OciError> {
        let url = format!("{}/token", self.base(image));
        let scope = format!("repository:{}:pull", image.repository);
        debug!(%url, %scope, "Requesting registry token");

        let resp = self
            .client
            .get(&url)
            .query(&[("service", image.registry.as_str()), ("scope", scope.as_str())])
            .header(USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| OciError::Auth(e.to_string()))?;
        let body: TokenResponse = resp.json().await.map_err(|e| OciError::Auth(e.to_string()))?;

        match (body.token, body.access_token) {
            (t, _) if !t.is_empty() => Ok(t),
            (_, t) if !t.is_empty() => Ok(t),
            _ => Err(OciError::Auth("registry returned an empty token".into())),
        }
    }

    /// Fetch the manifest for `image`'s tag.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::Manifest`] on a non-success status or bad JSON.
    pub async fn manifest(&self, image: &ImageRef, token: &str) -> Result<Manifest, OciError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base(image),
            image.repository,
            image.tag
        );
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, MANIFEST_MEDIA_TYPE)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OciError::Manifest(format!("{url}: HTTP {}", resp.status())));
        }
        resp.json()
            .await
            .map_err(|e| OciError::Manifest(format!("{url}: {e}")))
    }

    /// Locate the layer carrying `file_name` in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::LayerNotFound`] when no binary layer matches; a
    /// missing signature layer is not an error.
    pub async fn resolve_layer(
        &self,
        image: &ImageRef,
        file_name: &str,
    ) -> Result<ResolvedLayer, OciError> {
        let token = self.token(image).await?;
        let manifest = self.manifest(image, &token).await?;
        let (blob, signature) = manifest.find(file_name);
        let blob = blob.cloned().ok_or_else(|| OciError::LayerNotFound {
            reference: image.to_string(),
            name: file_name.to_string(),
        })?;
        debug!(
            image = %image,
            digest = %blob.digest,
            signed = signature.is_some(),
            "Resolved OCI layer"
        );
        Ok(ResolvedLayer {
            image: image.clone(),
            token,
            blob,
            signature: signature.cloned(),
        })
    }

    /// Start streaming a blob, from `offset` when non-zero.
    ///
    /// A registry ignoring the range answers `200 OK`; callers must check
    /// for `206 Partial Content` before appending.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::Http`] on transport failure or error status.
    pub async fn open_blob(
        &self,
        image: &ImageRef,
        token: &str,
        digest: &str,
        offset: u64,
    ) -> Result<Response, OciError> {
        let url = format!("{}/v2/{}/blobs/{digest}", self.base(image), image.repository);
        let mut req = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(USER_AGENT, crate::USER_AGENT);
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        let resp = req.send().await?;
        if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(resp);
        }
        Ok(resp.error_for_status()?)
    }

    /// Read a small blob, such as a signature, as text.
    ///
    /// # Errors
    ///
    /// Returns [`OciError::Http`] on failure.
    pub async fn blob_text(
        &self,
        image: &ImageRef,
        token: &str,
        digest: &str,
    ) -> Result<String, OciError> {
        let resp = self.open_blob(image, token, digest, 0).await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn parse_references() {
        let r = ImageRef::parse("oci://ghcr.io/org/pkg/jq:1.7").unwrap();
        assert_eq!(
            (r.registry.as_str(), r.repository.as_str(), r.tag.as_str()),
            ("ghcr.io", "org/pkg/jq", "1.7")
        );

        let r = ImageRef::parse("alpine").unwrap();
        assert_eq!(r.to_string(), "docker.io/library/alpine:latest");

        let r = ImageRef::parse("user/tool:v2").unwrap();
        assert_eq!(r.to_string(), "docker.io/user/tool:v2");

        let r = ImageRef::parse("localhost:5000/tool").unwrap();
        assert_eq!(
            (r.registry.as_str(), r.tag.as_str()),
            ("localhost:5000", "latest")
        );

        assert!(ImageRef::parse("oci://").is_err());
        assert!(ImageRef::parse("ghcr.io/org/:tag").is_err());
    }

    fn layer(title: &str, digest: &str) -> serde_json::Value {
        serde_json::json!({
            "mediaType": "application/octet-stream",
            "digest": digest,
            "size": 4,
            "annotations": { TITLE_ANNOTATION: title }
        })
    }

    #[test]
    fn find_matches_name_and_stem() {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "layers": [layer("README", "sha256:0"), layer("tool", "sha256:1"), layer("tool.sig", "sha256:2")]
        }))
        .unwrap();

        let (bin, sig) = manifest.find("tool");
        assert_eq!(bin.unwrap().digest, "sha256:1");
        assert_eq!(sig.unwrap().digest, "sha256:2");

        let (bin, sig) = manifest.find("tool.AppImage");
        assert_eq!(bin.unwrap().digest, "sha256:1");
        assert_eq!(sig.unwrap().digest, "sha256:2");

        assert!(manifest.find("other").0.is_none());
    }

    /// Mock the token and manifest endpoints for `org/tool:v1`. Layer `i`
    /// is titled `titles[i]` with digest `sha256:i`.
    pub(crate) async fn mock_manifest(
        server: &mut mockito::ServerGuard,
        titles: &[&str],
    ) -> Vec<mockito::Mock> {
        let layers: Vec<_> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| layer(title, &format!("sha256:{i}")))
            .collect();
        vec![
            server
                .mock("GET", "/token")
                .match_query(mockito::Matcher::AllOf(vec![
                    mockito::Matcher::UrlEncoded("scope".into(), "repository:org/tool:pull".into()),
                ]))
                .with_body(r#"{"token":"t0k"}"#)
                .create_async()
                .await,
            server
                .mock("GET", "/v2/org/tool/manifests/v1")
                .match_header("accept", MANIFEST_MEDIA_TYPE)
                .match_header("authorization", "Bearer t0k")
                .with_body(serde_json::json!({ "schemaVersion": 2, "layers": layers }).to_string())
                .create_async()
                .await,
        ]
    }

    /// Mock a registry serving `files` (title, body) under `org/tool:v1`.
    pub(crate) async fn mock_registry(
        server: &mut mockito::ServerGuard,
        files: &[(&str, &[u8])],
    ) -> Vec<mockito::Mock> {
        let titles: Vec<&str> = files.iter().map(|(title, _)| *title).collect();
        let mut mocks = mock_manifest(server, &titles).await;
        for (i, (_, body)) in files.iter().enumerate() {
            mocks.push(
                server
                    .mock("GET", format!("/v2/org/tool/blobs/sha256:{i}").as_str())
                    .match_header("authorization", "Bearer t0k")
                    .with_body(body)
                    .create_async()
                    .await,
            );
        }
        mocks
    }

    #[tokio::test]
    async fn resolves_layer_and_streams_blob() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_registry(&mut server, &[("tool", b"\x7fELF")]).await;

        let client = OciClient::new(Client::new()).with_plain_http(true);
        let image = ImageRef::parse(&format!("oci://{}/org/tool:v1", server.host_with_port())).unwrap();

        let resolved = client.resolve_layer(&image, "tool").await.unwrap();
        assert!(resolved.signature.is_none());

        let body = client
            .open_blob(&image, &resolved.token, &resolved.blob.digest, 0)
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"\x7fELF");
    }

    #[tokio::test]
    async fn missing_layer_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_registry(&mut server, &[("other", b"x")]).await;

        let client = OciClient::new(Client::new()).with_plain_http(true);
        let image = ImageRef::parse(&format!("{}/org/tool:v1", server.host_with_port())).unwrap();
        let err = client.resolve_layer(&image, "tool").await.unwrap_err();
        assert!(matches!(err, OciError::LayerNotFound { .. }));
    }

    #[tokio::test]
    async fn token_failure_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/token")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let client = OciClient::new(Client::new()).with_plain_http(true);
        let image = ImageRef::parse(&format!("{}/org/tool:v1", server.host_with_port())).unwrap();
        assert!(matches!(
            client.token(&image).await,
            Err(OciError::Auth(_))
        ));
    }
}
