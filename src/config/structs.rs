use super::impls::deserialize_level_filter;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf};

pub const DEFAULT_PROFILE: &str = "main-x86_64";
pub const DEFAULT_IMAGES_DIR: &str = "/var/lib/solbuild/images";
pub const DEFAULT_ROOTS_DIR: &str = "/var/lib/solbuild/roots";
pub const DEFAULT_OVERLAY_DIR: &str = "/var/cache/solbuild";
pub const DEFAULT_SOURCES_DIR: &str = "/var/lib/solbuild/sources";
pub const DEFAULT_PACKAGES_DIR: &str = "/var/lib/solbuild/packages";
pub const DEFAULT_IMAGE_BASE_URI: &str = "https://solus-project.com/image_root";
pub const DEFAULT_PROFILE_DIRS: [&str; 2] =
    ["/usr/share/solbuild", "/etc/solbuild"];
pub const DEFAULT_LOOPBACK_COMMAND: &str = "/sbin/ip link set lo up";
pub const DEFAULT_HOSTNAME: &str = "solbuild";

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub profile: Option<String>,
    pub images_dir: Option<PathBuf>,
    pub roots_dir: Option<PathBuf>,
    pub image_base_uri: Option<String>,
    pub overlay_dir: Option<PathBuf>,
    pub sources_dir: Option<PathBuf>,
    pub packages_dir: Option<PathBuf>,
    pub profile_dirs: Option<Vec<PathBuf>>,
    pub loopback_command: Option<String>,
    pub hostname: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub profile: String,
    pub images_dir: PathBuf,
    pub roots_dir: PathBuf,
    pub image_base_uri: String,
    pub overlay_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub profile_dirs: Vec<PathBuf>,
    /// Run inside the root to bring up loopback once networking is dropped.
    pub loopback_command: String,
    pub hostname: String,
    /// Where each value came from: a config file path, "environment", "cli"
    /// or "default".
    pub sources: HashMap<String, String>,
}
