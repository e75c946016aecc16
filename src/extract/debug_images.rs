//! Optional diagnostic images written while extracting.

use std::sync::Arc;

use image::{DynamicImage, ImageFormat};

use crate::{async_utils::spawn_blocking_propagating_panics, prelude::*};

/// Where to write diagnostic images, if anywhere.
///
/// Writing is best effort. Failures are logged and never affect extraction.
#[derive(Clone, Debug, Default)]
pub struct DebugImages {
    dir: Option<PathBuf>,
}

impl DebugImages {
    /// Don't write any images.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Write images to `dir`, creating it as needed.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    /// Save `image` as `name` in the debug directory.
    pub async fn save(&self, name: &str, image: Arc<DynamicImage>) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(name);
        let result = {
            let dir = dir.clone();
            let path = path.clone();
            spawn_blocking_propagating_panics(move || -> Result<()> {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {:?}", dir.display()))?;
                image
                    .save_with_format(&path, ImageFormat::Png)
                    .with_context(|| format!("failed to write {:?}", path.display()))
            })
            .await
        };
        match result {
            Ok(()) => trace!(path = %path.display(), "Wrote debug image"),
            Err(err) => warn!("could not save debug image: {:?}", err),
        }
    }
}
