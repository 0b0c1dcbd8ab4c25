use std::path::PathBuf;

/// Errors raised by the sandbox and build pipeline. The CLI layer wraps these
/// in `anyhow` with additional context.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("You must be root to {action}")]
    Privilege { action: &'static str },

    #[error("Profile '{0}' does not exist")]
    UnknownProfile(String),

    #[error("Profile '{0}' has not been initialised")]
    ProfileNotInstalled(String),

    #[error("Failed to parse recipe {}: {reason}", path.display())]
    RecipeParse { path: PathBuf, reason: String },

    #[error("Failed to mount {}: {source}", target.display())]
    Mount {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to clean existing mount {}: {source}", path.display())]
    MountCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to configure networking: {0}")]
    NetworkConfig(String),

    #[error("Failed to initialise package manager: {0}")]
    PackageManagerInit(String),

    #[error("Service bus failure: {0}")]
    ServiceBus(String),

    #[error("Failed to upgrade system base: {0}")]
    Upgrade(String),

    #[error("Failed to install component {component}: {reason}")]
    ComponentInstall { component: String, reason: String },

    #[error("Failed to fetch image {uri}: {reason}")]
    ImageFetch { uri: String, reason: String },

    #[error("Failed to fetch source {uri}: {reason}")]
    SourceFetch { uri: String, reason: String },

    #[error("Failed to stage source {}: {reason}", path.display())]
    SourceStage { path: PathBuf, reason: String },

    #[error("Command `{command}` failed: {status}")]
    BuildExec { command: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub fn mount(
        target: impl Into<PathBuf>,
        source: impl Into<std::io::Error>,
    ) -> Self {
        BuildError::Mount {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn stage(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BuildError::SourceStage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
