use super::Config;
use crate::error::BuildError;
use crate::image::BackingImage;
use anyhow::{Context, Result};
use log::{debug, trace};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

const BUILTIN_PROFILES: [&str; 2] = ["main-x86_64", "unstable-x86_64"];

/// A named build profile, pointing at the backing image it builds on.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    pub image: String,
    /// Overrides `<image_base_uri>/<image>.img.xz`.
    pub image_uri: Option<String>,
}

pub struct ProfileStore {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Load `*.profile` files from `dirs`. Files in later directories replace
    /// same-named profiles from earlier ones. Falls back to the built-in
    /// profiles when nothing is found.
    pub fn load(dirs: &[PathBuf]) -> Result<ProfileStore> {
        let mut profiles = BTreeMap::new();

        for dir in dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                trace!("No profiles in {}", dir.display());
                continue;
            };

            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.extension().is_some_and(|ext| ext == "profile")
                })
                .collect();
            paths.sort();

            for path in paths {
                let Some(name) = path.file_stem().and_then(|s| s.to_str())
                else {
                    continue;
                };
                let content = std::fs::read_to_string(&path).context(
                    format!("Failed to read profile {}", path.display()),
                )?;
                let mut profile: Profile = toml::from_str(&content).context(
                    format!("Failed to parse profile {}", path.display()),
                )?;
                profile.name = name.to_string();
                debug!("Loaded profile {} from {}", name, path.display());
                profiles.insert(profile.name.clone(), profile);
            }
        }

        if profiles.is_empty() {
            for name in BUILTIN_PROFILES {
                profiles.insert(
                    name.to_string(),
                    Profile {
                        name: name.to_string(),
                        image: name.to_string(),
                        image_uri: None,
                    },
                );
            }
        }

        Ok(ProfileStore { profiles })
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<&Profile, BuildError> {
        self.profiles
            .get(name)
            .ok_or_else(|| BuildError::UnknownProfile(name.to_string()))
    }

    pub fn backing_image(
        &self,
        name: &str,
        config: &Config,
    ) -> Result<BackingImage, BuildError> {
        let profile = self.get(name)?;
        let uri = profile.image_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/{}.img.xz",
                config.image_base_uri.trim_end_matches('/'),
                profile.image
            )
        });
        Ok(BackingImage::new(
            &profile.image,
            &uri,
            &config.images_dir,
            &config.roots_dir,
        ))
    }

    /// Like [`ProfileStore::backing_image`], but the image must already be
    /// initialised.
    pub fn require_installed(
        &self,
        name: &str,
        config: &Config,
    ) -> Result<BackingImage, BuildError> {
        let image = self.backing_image(name, config)?;
        if !image.is_installed() {
            return Err(BuildError::ProfileNotInstalled(name.to_string()));
        }
        Ok(image)
    }
}
