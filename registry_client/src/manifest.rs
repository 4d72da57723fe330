//! Manifest documents returned by `GET /v2/<name>/manifests/<reference>`.

use serde::Deserialize;

pub const SCHEMA1_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const SCHEMA1_SIGNED_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const SCHEMA2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Value of the `Accept` header on manifest requests.
pub fn accept_header() -> String {
    [
        SCHEMA2_MEDIA_TYPE,
        MANIFEST_LIST_MEDIA_TYPE,
        OCI_MANIFEST_MEDIA_TYPE,
        OCI_INDEX_MEDIA_TYPE,
        SCHEMA1_SIGNED_MEDIA_TYPE,
        SCHEMA1_MEDIA_TYPE,
    ]
    .join(", ")
}

/// The fields of any manifest flavour that lead to an architecture.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema 1 carries the architecture inline.
    #[serde(default)]
    pub architecture: Option<String>,
    /// Schema 2 and OCI image manifests point at a config blob.
    #[serde(default)]
    pub config: Option<Descriptor>,
    /// Manifest lists and OCI indexes carry one entry per platform.
    #[serde(default)]
    pub manifests: Option<Vec<PlatformDescriptor>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformDescriptor {
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub architecture: String,
}

/// Image config blob; only the architecture is read.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub architecture: Option<String>,
}

/// Where a manifest's architecture comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchitectureSource {
    /// Named directly in the manifest.
    Inline(String),
    /// Must be read from the config blob with this digest.
    ConfigBlob(String),
    /// Nothing in the manifest identifies it.
    Unknown,
}

impl Manifest {
    pub fn architecture_source(&self) -> ArchitectureSource {
        if let Some(arch) = self.architecture.as_ref().filter(|a| !a.is_empty()) {
            return ArchitectureSource::Inline(arch.clone());
        }
        if let Some(platform) = self
            .manifests
            .iter()
            .flatten()
            .find_map(|entry| entry.platform.as_ref())
        {
            return ArchitectureSource::Inline(platform.architecture.clone());
        }
        match &self.config {
            Some(config) => ArchitectureSource::ConfigBlob(config.digest.clone()),
            None => ArchitectureSource::Unknown,
        }
    }
}
