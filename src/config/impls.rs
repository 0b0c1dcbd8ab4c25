use super::structs::Config;

use serde::Deserialize;
use std::str::FromStr;

impl Config {
    /// Values as `(key, value)` pairs in a stable order, for debug output.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let join = |dirs: &[std::path::PathBuf]| {
            dirs.iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(":")
        };
        vec![
            ("log_level", self.log_level.to_string()),
            ("profile", self.profile.clone()),
            ("images_dir", self.images_dir.display().to_string()),
            ("roots_dir", self.roots_dir.display().to_string()),
            ("image_base_uri", self.image_base_uri.clone()),
            ("overlay_dir", self.overlay_dir.display().to_string()),
            ("sources_dir", self.sources_dir.display().to_string()),
            ("packages_dir", self.packages_dir.display().to_string()),
            ("profile_dirs", join(&self.profile_dirs)),
            ("loopback_command", self.loopback_command.clone()),
            ("hostname", self.hostname.clone()),
        ]
    }

    pub fn source_of(&self, key: &str) -> &str {
        self.sources.get(key).map(String::as_str).unwrap_or("default")
    }
}

pub(crate) fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}

#[cfg(test)]
mod tests {
    use super::super::PartialConfig;

    #[test]
    fn test_partial_config_from_toml() {
        let config: PartialConfig = toml::from_str(
            r#"
            log_level = "debug"
            profile = "unstable-x86_64"
            profile_dirs = ["/opt/profiles"]
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, Some(log::LevelFilter::Debug));
        assert_eq!(config.profile.as_deref(), Some("unstable-x86_64"));
        assert_eq!(config.profile_dirs.unwrap().len(), 1);
    }

    #[test]
    fn test_partial_config_rejects_bad_level() {
        let config: Result<PartialConfig, _> =
            toml::from_str(r#"log_level = "loud""#);
        assert!(config.is_err());
    }

    #[test]
    fn test_partial_config_rejects_unknown_key() {
        let config: Result<PartialConfig, _> =
            toml::from_str(r#"storage_dir = "/tmp""#);
        assert!(config.is_err());
    }
}
