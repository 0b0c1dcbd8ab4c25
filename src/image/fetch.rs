use crate::error::{BuildError, Result};
use crate::util::download;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::process::Command;

/// Downloads and unpacks backing images.
pub trait ImageFetcher: Send + Sync {
    /// Download `uri` to `dest`. A partial file is removed on failure.
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()>;

    /// Decompress an `.img.xz` in place, leaving the `.img` beside it.
    fn decompress(&self, archive: &Path) -> Result<()>;
}

pub struct HttpImageFetcher;

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}", uri);
        let fail = |reason: String| {
            let _ = std::fs::remove_file(dest);
            BuildError::ImageFetch {
                uri: uri.to_string(),
                reason,
            }
        };

        let file = File::create(dest).map_err(|e| {
            fail(format!("cannot create {}: {}", dest.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| uri.to_string());

        let bytes = download(uri, &mut writer, &label).map_err(fail)?;
        debug!("Fetched {} bytes into {}", bytes, dest.display());
        Ok(())
    }

    fn decompress(&self, archive: &Path) -> Result<()> {
        debug!("Decompressing backing image {}", archive.display());
        let mut command = Command::new("unxz");
        command.arg(archive);
        if let Some(dir) = archive.parent() {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|e| BuildError::ImageFetch {
            uri: archive.display().to_string(),
            reason: format!("cannot run unxz: {}", e),
        })?;
        if !status.success() {
            return Err(BuildError::ImageFetch {
                uri: archive.display().to_string(),
                reason: format!("unxz failed: {}", status),
            });
        }
        Ok(())
    }
}
