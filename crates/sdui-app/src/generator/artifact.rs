use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};
use tempfile::NamedTempFile;
use tracing::debug;
use sdui_core::{Error, RequestId};

pub const RESULTS_DIR_NAME: &str = "Stable Diffusion Results";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Writes finished images to `<dir>/<id>.jpeg`.
///
/// Bytes go to a hidden temp file in the same directory first and are then
/// renamed into place, so a reader sees either nothing or the whole file.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<pictures_root>/Stable Diffusion Results`
    pub fn under_pictures(pictures_root: &Path) -> Self {
        Self::new(pictures_root.join(RESULTS_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: RequestId) -> PathBuf {
        self.dir.join(format!("{id}.jpeg"))
    }

    pub fn persist(&self, bytes: &[u8], id: RequestId) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::persistence(&format!("creating {}", self.dir.display()), e)
        })?;

        let path = self.path_for(id);
        let prefix = format!(".{id}-");

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".partial")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::persistence(&format!("creating temp file in {}", self.dir.display()), e))?;

        write_synced(&mut tmp, bytes)
            .map_err(|e| Error::persistence(&format!("writing artifact for {id}"), e))?;

        // Ids are never reused, so an existing file is an error rather than something to replace
        tmp.persist_noclobber(&path)
            .map_err(|e| Error::persistence(&format!("publishing {}", path.display()), e.error))?;

        debug!(path = %path.display(), size = bytes.len(), "Artifact written");
        Ok(path)
    }
}

fn write_synced(tmp: &mut NamedTempFile, bytes: &[u8]) -> io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()
}

/// JPEG-encodes `image`, keeping grayscale output grayscale.
///
/// JPEG has no alpha channel, so alpha is dropped.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));

    let encoded = match image.color() {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => {
            DynamicImage::ImageLuma8(image.to_luma8()).write_with_encoder(encoder)
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder),
    };
    encoded.map_err(|e| Error::Inference(format!("encoding image: {e}")))?;

    Ok(bytes)
}
