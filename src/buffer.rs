use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::instrument;

use crate::{error::OcrError, util::crop, Region};

/// Crops of one request, cut lazily from the borrowed source image.
///
/// Nothing is shared between requests: the buffer lives as long as the call
/// that created it, and persisting writes only into a directory the caller
/// owns.
pub struct CropBuffer<'a> {
    source: &'a DynamicImage,
    regions: Vec<Region>,
}

impl<'a> CropBuffer<'a> {
    pub fn new(source: &'a DynamicImage, regions: Vec<Region>) -> Self {
        Self { source, regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn crop(&self, region: &Region) -> DynamicImage {
        crop(self.source, region)
    }

    /// Regions in reading order, each with its crop.
    pub fn iter(&self) -> impl Iterator<Item = (&Region, DynamicImage)> + '_ {
        self.regions.iter().map(|region| (region, self.crop(region)))
    }

    /// Writes every non-empty crop as `<index>.jpg` into `dir`, which must
    /// already exist.
    #[instrument(level = "debug", skip(self, dir))]
    pub fn persist(&self, dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
        let mut written = Vec::with_capacity(self.regions.len());
        for (region, image) in self.iter() {
            if image.width() == 0 || image.height() == 0 {
                log::debug!("Skipping empty crop for region {}", region.index);
                continue;
            }
            let path = dir.join(format!("{}.jpg", region.index));
            image.to_rgb8().save(&path)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Persists into a fresh, uniquely named directory under `root`, so
    /// concurrent requests sharing a root never overwrite each other. The
    /// directory is kept after the call.
    #[instrument(level = "debug", skip(self, root))]
    pub fn persist_scoped(&self, root: &Path) -> Result<(PathBuf, Vec<PathBuf>), OcrError> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("request-")
            .tempdir_in(root)?
            .into_path();
        let written = self.persist(&dir)?;
        Ok((dir, written))
    }
}
