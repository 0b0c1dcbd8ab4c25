mod pspec;
mod ypkg;

use crate::error::{BuildError, Result};
use crate::types::Package;
use std::path::{Path, PathBuf};

pub const MODERN_RECIPE: &str = "package.yml";
pub const LEGACY_RECIPE: &str = "pspec.xml";

/// Turns a recipe on disk into a [`Package`].
pub trait RecipeLoader {
    fn load(&self, path: &Path) -> Result<Package>;
}

/// Picks the parser from the file name: `*.xml` is a legacy recipe,
/// anything else is treated as `package.yml`.
pub struct FileRecipeLoader;

impl RecipeLoader for FileRecipeLoader {
    fn load(&self, path: &Path) -> Result<Package> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BuildError::RecipeParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let is_legacy = path.extension().is_some_and(|ext| ext == "xml");
        let parsed = if is_legacy {
            pspec::parse(&content)
        } else {
            ypkg::parse(&content)
        };

        let mut package = parsed.map_err(|reason| BuildError::RecipeParse {
            path: path.to_path_buf(),
            reason,
        })?;
        package.path = path.to_path_buf();
        Ok(package)
    }
}

/// The recipe in `dir`, preferring `package.yml` over `pspec.xml`.
pub fn find_likely_recipe(dir: &Path) -> Option<PathBuf> {
    [MODERN_RECIPE, LEGACY_RECIPE]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
