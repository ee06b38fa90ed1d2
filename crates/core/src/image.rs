use tracing::{debug, info, trace};

use crate::{ContainerRuntime, FixtureError, ImageRef, PullPolicy, PullProgress};

/// Makes sure an image is present locally before anything is launched from
/// it. Progress events are collected for diagnostics and never required by
/// the caller.
pub struct ImageProvisioner<'a, R> {
    runtime: &'a R,
}

impl<'a, R: ContainerRuntime> ImageProvisioner<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    pub async fn ensure(
        &self,
        image: &ImageRef,
        policy: PullPolicy,
    ) -> Result<Vec<PullProgress>, FixtureError> {
        if policy == PullPolicy::IfNotPresent {
            let present = self
                .runtime
                .image_exists(image)
                .await
                .map_err(|source| FixtureError::PullFailed {
                    image: image.clone(),
                    source,
                })?;

            if present {
                debug!(%image, "image already present, skipping pull");
                return Ok(vec![]);
            }
        }

        info!(%image, "pulling image");

        let progress = self
            .runtime
            .pull_image(image)
            .await
            .map_err(|source| FixtureError::PullFailed {
                image: image.clone(),
                source,
            })?;

        for event in progress.iter() {
            trace!(%image, status = %event.status, detail = ?event.detail, "pull progress");
        }

        info!(%image, events = progress.len(), "image pulled");

        Ok(progress)
    }
}
