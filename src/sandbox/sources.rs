use super::Session;
use crate::error::{BuildError, Result};
use crate::types::{HashAlgorithm, Package, Source};
use crate::util::{download, file_digest};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Fetches a source archive over the network.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()>;
}

pub struct HttpSourceFetcher;

impl SourceFetcher for HttpSourceFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()> {
        let fail = |reason: String| BuildError::SourceFetch {
            uri: uri.to_string(),
            reason,
        };
        let file = File::create(dest).map_err(|e| fail(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        download(uri, &mut writer, &label).map_err(fail)?;
        Ok(())
    }
}

/// What a fetch pass did with each source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: Vec<String>,
    pub cached: Vec<String>,
    /// `(uri, reason)`
    pub failed: Vec<(String, String)>,
}

/// Content addressed store of source archives: `<root>/<hash>/<file>`.
pub struct SourceCache {
    root: PathBuf,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> SourceCache {
        SourceCache { root: root.into() }
    }

    pub fn path_for(&self, source: &Source) -> PathBuf {
        self.root.join(&source.hash).join(&source.file)
    }

    /// Present iff the cache entry exists and its digest matches.
    pub fn is_present(
        &self,
        source: &Source,
        algorithm: HashAlgorithm,
    ) -> bool {
        let path = self.path_for(source);
        match file_digest(&path, algorithm) {
            Ok(digest) => digest == source.hash,
            Err(_) => false,
        }
    }

    /// Fetch `source` once into a temporary file, verify it, then move it
    /// into place.
    pub fn fetch_one(
        &self,
        source: &Source,
        algorithm: HashAlgorithm,
        fetcher: &dyn SourceFetcher,
    ) -> Result<()> {
        let fail = |reason: String| BuildError::SourceFetch {
            uri: source.uri.clone(),
            reason,
        };
        let dest = self.path_for(source);
        let dir = self.root.join(&source.hash);
        std::fs::create_dir_all(&dir).map_err(|e| fail(e.to_string()))?;
        let partial = dir.join(format!(".{}.partial", source.file));

        let result = fetcher.fetch(&source.uri, &partial).and_then(|()| {
            let digest = file_digest(&partial, algorithm)
                .map_err(|e| fail(e.to_string()))?;
            if digest != source.hash {
                return Err(fail(format!(
                    "hash mismatch, expected {} but got {}",
                    source.hash, digest
                )));
            }
            std::fs::rename(&partial, &dest).map_err(|e| fail(e.to_string()))
        });

        if result.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        result
    }

    /// Make sure every source of `package` is cached. Failures are logged and
    /// reported, they never stop the pass.
    pub fn fetch_sources(
        &self,
        package: &Package,
        fetcher: &dyn SourceFetcher,
    ) -> FetchReport {
        let algorithm = package.kind.hash_algorithm();
        let mut report = FetchReport::default();

        for source in &package.sources {
            if self.is_present(source, algorithm) {
                debug!("Source {} is cached", source.file);
                report.cached.push(source.uri.clone());
                continue;
            }

            info!("Fetching source {}", source.uri);
            match self.fetch_one(source, algorithm, fetcher) {
                Ok(()) => report.fetched.push(source.uri.clone()),
                Err(e) => {
                    error!("{}", e);
                    report.failed.push((source.uri.clone(), e.to_string()));
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(
                "{} of {} sources could not be fetched",
                report.failed.len(),
                package.sources.len()
            );
        }
        report
    }
}

/// Expose each cached source read-only inside the root, in the directory the
/// recipe's build tool reads archives from.
pub fn bind_sources(
    session: &Session,
    package: &Package,
    cache: &SourceCache,
) -> Result<()> {
    let target_dir = package.source_dir(&session.mount_point());
    if session.is_released() {
        return Err(BuildError::stage(&target_dir, "session was torn down"));
    }
    std::fs::create_dir_all(&target_dir)
        .map_err(|e| BuildError::stage(&target_dir, e))?;

    for source in &package.sources {
        let cached = cache.path_for(source);
        if !cached.is_file() {
            return Err(BuildError::stage(&cached, "not in the source cache"));
        }

        let placeholder = target_dir.join(&source.file);
        File::create(&placeholder)
            .map_err(|e| BuildError::stage(&placeholder, e))?;

        debug!("Binding {} into the root", source.file);
        session
            .bind_into_root(&cached, &placeholder, true)
            .map_err(|e| BuildError::stage(&placeholder, e))?;
    }
    Ok(())
}
