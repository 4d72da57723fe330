//! One entry per matching repository: its first tag and that tag's
//! architecture.

use tracing::warn;

use gateway_shared_types::RepoImage;

use crate::{ImageRegistry, Result};

/// List repositories whose name starts with `prefix`.
///
/// `id` is the repository's position in the full catalog, not among the
/// matches. Only the first tag the registry returns is inspected. Failing to
/// read tags or a manifest leaves `tag`/`arch` empty instead of failing the
/// whole listing; a failed catalog read does fail it.
pub async fn first_tag_images(registry: &dyn ImageRegistry, prefix: &str) -> Result<Vec<RepoImage>> {
    let repositories = registry.repositories().await?;
    let mut images = Vec::new();

    for (index, name) in repositories.iter().enumerate() {
        if !name.starts_with(prefix) {
            continue;
        }

        let mut image = RepoImage {
            id: index.to_string(),
            name: name.clone(),
            tag: None,
            arch: None,
        };

        match registry.tags(name).await {
            Ok(tags) => {
                if let Some(tag) = tags.into_iter().next() {
                    match registry.architecture(name, &tag).await {
                        Ok(arch) => image.arch = Some(arch),
                        Err(e) => warn!(repository = %name, tag = %tag, error = %e, "Failed to read manifest"),
                    }
                    image.tag = Some(tag);
                }
            }
            Err(e) => warn!(repository = %name, error = %e, "Failed to list tags"),
        }

        images.push(image);
    }

    Ok(images)
}
