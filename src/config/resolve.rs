use super::PartialConfig;
use super::cli::Args;
use super::structs::*;
use crate::config::Config;
use anyhow::{Context, Result};
use log::trace;
use std::collections::HashMap;
use std::path::PathBuf;
use std::{env, str::FromStr};

const CONFIG_FILES: [&str; 2] =
    ["/usr/share/solbuild/config.toml", "/etc/solbuild/config.toml"];

pub fn resolve_config(cli: Args) -> Result<Config> {
    let (mut partial_config, mut sources) = load_partial(cli.no_config)?;

    apply_environment(&mut partial_config, &mut sources)?;

    // Override with CLI args if provided (highest precedence)
    if let Some(log_level) = cli.log_level {
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "cli".into());
    } else if cli.debug {
        partial_config.log_level = Some(log::LevelFilter::Debug);
        sources.insert("log_level".into(), "cli".into());
    }

    if let Some(profile) = cli.requested_profile() {
        partial_config.profile = Some(profile);
        sources.insert("profile".into(), "cli".into());
    }

    let mut or_default = |key: &str| {
        sources
            .entry(key.to_string())
            .or_insert_with(|| "default".into());
    };
    for key in [
        "log_level",
        "profile",
        "images_dir",
        "roots_dir",
        "image_base_uri",
        "overlay_dir",
        "sources_dir",
        "packages_dir",
        "profile_dirs",
        "loopback_command",
        "hostname",
    ] {
        or_default(key);
    }

    let config = Config {
        log_level: partial_config.log_level.unwrap_or(log::LevelFilter::Info),
        profile: partial_config
            .profile
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        images_dir: partial_config
            .images_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_DIR)),
        roots_dir: partial_config
            .roots_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOTS_DIR)),
        image_base_uri: partial_config
            .image_base_uri
            .unwrap_or_else(|| DEFAULT_IMAGE_BASE_URI.to_string()),
        overlay_dir: partial_config
            .overlay_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OVERLAY_DIR)),
        sources_dir: partial_config
            .sources_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCES_DIR)),
        packages_dir: partial_config
            .packages_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PACKAGES_DIR)),
        profile_dirs: partial_config.profile_dirs.unwrap_or_else(|| {
            DEFAULT_PROFILE_DIRS.iter().map(PathBuf::from).collect()
        }),
        loopback_command: partial_config
            .loopback_command
            .unwrap_or_else(|| DEFAULT_LOOPBACK_COMMAND.to_string()),
        hostname: partial_config
            .hostname
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
        sources,
    };

    validate_config(&config)?;

    for (key, value) in config.entries() {
        trace!("{} = {} ({})", key, value, config.source_of(key));
    }

    Ok(config)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn apply_environment(
    partial_config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
) -> Result<()> {
    if let Some(log_level) = env_value("SOLBUILD_LOG_LEVEL") {
        let level = log::LevelFilter::from_str(&log_level).map_err(|_| {
            anyhow::anyhow!("Invalid log level: {}", log_level)
        })?;
        partial_config.log_level = Some(level);
        sources.insert("log_level".into(), "environment".into());
    }

    if let Some(profile) = env_value("SOLBUILD_PROFILE") {
        partial_config.profile = Some(profile);
        sources.insert("profile".into(), "environment".into());
    }

    let dirs: [(&str, &str, &mut Option<PathBuf>); 5] = [
        (
            "SOLBUILD_IMAGES_DIR",
            "images_dir",
            &mut partial_config.images_dir,
        ),
        (
            "SOLBUILD_ROOTS_DIR",
            "roots_dir",
            &mut partial_config.roots_dir,
        ),
        (
            "SOLBUILD_OVERLAY_DIR",
            "overlay_dir",
            &mut partial_config.overlay_dir,
        ),
        (
            "SOLBUILD_SOURCES_DIR",
            "sources_dir",
            &mut partial_config.sources_dir,
        ),
        (
            "SOLBUILD_PACKAGES_DIR",
            "packages_dir",
            &mut partial_config.packages_dir,
        ),
    ];
    for (var, key, slot) in dirs {
        if let Some(value) = env_value(var) {
            *slot = Some(PathBuf::from(value));
            sources.insert(key.into(), "environment".into());
        }
    }

    if let Some(dirs) = env_value("SOLBUILD_PROFILE_DIRS") {
        partial_config.profile_dirs = Some(
            dirs.split(':')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect(),
        );
        sources.insert("profile_dirs".into(), "environment".into());
    }

    Ok(())
}

pub fn load_partial(
    no_config: bool,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths: Vec<PathBuf> = if no_config {
        vec![]
    } else {
        CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .collect()
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            path.to_str()
                .context("Failed to convert config path to str")?,
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    macro_rules! take {
        ($field:ident) => {
            if let Some(value) = override_config.$field {
                base.$field = Some(value);
                sources.insert(stringify!($field).into(), source.into());
            }
        };
    }

    take!(log_level);
    take!(profile);
    take!(images_dir);
    take!(roots_dir);
    take!(image_base_uri);
    take!(overlay_dir);
    take!(sources_dir);
    take!(packages_dir);
    take!(profile_dirs);
    take!(loopback_command);
    take!(hostname);
}

fn validate_config(config: &Config) -> Result<()> {
    if config.profile.is_empty() || config.profile.contains('/') {
        return Err(anyhow::anyhow!(
            "Invalid profile name: {}",
            config.profile
        ));
    }

    if config.hostname.is_empty() {
        return Err(anyhow::anyhow!("Hostname must not be empty"));
    }

    for (key, dir) in [
        ("images_dir", &config.images_dir),
        ("roots_dir", &config.roots_dir),
        ("overlay_dir", &config.overlay_dir),
        ("sources_dir", &config.sources_dir),
        ("packages_dir", &config.packages_dir),
    ] {
        if !dir.is_absolute() {
            return Err(anyhow::anyhow!(
                "{} must be an absolute path, got {}",
                key,
                dir.display()
            ));
        }
    }

    Ok(())
}
