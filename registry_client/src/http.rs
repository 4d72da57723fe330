//! Docker Registry HTTP API v2 client.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::manifest::{accept_header, ArchitectureSource, ImageConfig, Manifest};
use crate::{ImageRegistry, RegistryError, Result};

/// Connection settings for a registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Base URL, e.g. `http://192.168.49.2:5000/`.
    pub url: String,
    /// Basic-auth user; anonymous when `None`.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound on each HTTP request.
    pub timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "http://192.168.49.2:5000/".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry client over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base: Url,
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpRegistry {
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        let mut raw = settings.url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw)?;
        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            base,
            client,
            username: settings.username,
            password: settings.password,
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let message = response.text().await.unwrap_or_default();
        Err(RegistryError::Status {
            url,
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, accept: Option<&str>) -> Result<(T, HeaderMap)> {
        debug!(url = %url, "Registry request");
        let mut request = self.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = self.send(request).await?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        Ok((serde_json::from_slice(&bytes)?, headers))
    }

    /// Follow `Link: <...>; rel="next"` pages starting at `path`, collecting
    /// the entries `extract` pulls out of each page. A page is fetched at
    /// most once; a link back to a visited page ends the listing.
    async fn paginate<P, F>(&self, path: &str, extract: F) -> Result<Vec<String>>
    where
        P: DeserializeOwned,
        F: Fn(P) -> Vec<String>,
    {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.base.join(path)?);

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                warn!(url = %url, "Registry pagination revisits a page, stopping");
                break;
            }
            let (page, headers) = self.get_json::<P>(url, None).await?;
            items.extend(extract(page));
            next = next_link(&headers)
                .map(|link| self.base.join(&link))
                .transpose()?;
        }
        Ok(items)
    }

    async fn manifest(&self, repository: &str, tag: &str) -> Result<Manifest> {
        let url = self.base.join(&format!("v2/{}/manifests/{}", repository, tag))?;
        let (manifest, _) = self.get_json::<Manifest>(url, Some(&accept_header())).await?;
        Ok(manifest)
    }

    async fn config_blob(&self, repository: &str, digest: &str) -> Result<ImageConfig> {
        let url = self.base.join(&format!("v2/{}/blobs/{}", repository, digest))?;
        let (config, _) = self.get_json::<ImageConfig>(url, None).await?;
        Ok(config)
    }
}

/// Target of the `rel="next"` entry of a `Link` header, if any.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find(|entry| {
            entry
                .split(';')
                .skip(1)
                .any(|param| matches!(param.trim(), "rel=\"next\"" | "rel=next"))
        })
        .and_then(|entry| {
            let entry = entry.trim();
            let start = entry.find('<')?;
            let end = entry.find('>')?;
            (start < end).then(|| entry[start + 1..end].to_string())
        })
}

#[async_trait]
impl ImageRegistry for HttpRegistry {
    async fn repositories(&self) -> Result<Vec<String>> {
        self.paginate("v2/_catalog", |page: CatalogPage| page.repositories.unwrap_or_default())
            .await
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        self.paginate(&format!("v2/{}/tags/list", repository), |page: TagsPage| {
            page.tags.unwrap_or_default()
        })
        .await
    }

    async fn architecture(&self, repository: &str, tag: &str) -> Result<String> {
        let manifest = self.manifest(repository, tag).await?;
        let reference = format!("{}:{}", repository, tag);

        match manifest.architecture_source() {
            ArchitectureSource::Inline(arch) => Ok(arch),
            ArchitectureSource::ConfigBlob(digest) => self
                .config_blob(repository, &digest)
                .await?
                .architecture
                .filter(|a| !a.is_empty())
                .ok_or(RegistryError::MissingArchitecture(reference)),
            ArchitectureSource::Unknown => Err(RegistryError::MissingArchitecture(reference)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn link_headers(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(LINK, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_next_link_parsing() {
        let headers = link_headers(&[r#"</v2/_catalog?last=iotd-b&n=2>; rel="next""#]);
        assert_eq!(next_link(&headers).as_deref(), Some("/v2/_catalog?last=iotd-b&n=2"));

        let headers = link_headers(&[r#"</v2/x?page=1>; rel="prev", </v2/x?page=3>; rel="next""#]);
        assert_eq!(next_link(&headers).as_deref(), Some("/v2/x?page=3"));

        assert_eq!(next_link(&HeaderMap::new()), None);
        assert_eq!(next_link(&link_headers(&[r#"</v2/x>; rel="prev""#])), None);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let registry = HttpRegistry::new(RegistrySettings {
            url: "http://registry.local:5000".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(registry.base_url().as_str(), "http://registry.local:5000/");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = HttpRegistry::new(RegistrySettings {
            url: "not a url".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl(_)));
    }
}
