use crate::types::Package;
use anyhow::{Context, Result};
use log::{debug, trace};
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy `source` (file or directory) to `dest`. Symlinks are
/// recreated rather than followed.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.context(format!("Walking {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?;
        let target = if relative.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .context(format!("Creating {}", target.display()))?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                std::fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(&link, &target)
                .context(format!("Linking {}", target.display()))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            trace!("{} -> {}", entry.path().display(), target.display());
            std::fs::copy(entry.path(), &target).context(format!(
                "Copying {} to {}",
                entry.path().display(),
                target.display()
            ))?;
        }
    }
    Ok(())
}

/// Copy the recipe and whichever support assets exist beside it into the
/// work directory.
pub fn copy_assets(package: &Package, work_dir: &Path) -> Result<()> {
    let recipe_dir = package
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    std::fs::create_dir_all(work_dir)
        .context(format!("Creating {}", work_dir.display()))?;

    copy_tree(&package.path, &work_dir.join(package.recipe_file_name()))?;

    for asset in package.kind.support_assets() {
        let source = recipe_dir.join(asset);
        if source.symlink_metadata().is_err() {
            continue;
        }
        debug!("Copying asset {}", asset);
        copy_tree(&source, &work_dir.join(asset))?;
    }
    Ok(())
}
