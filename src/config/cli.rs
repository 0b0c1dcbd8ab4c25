use super::{ProfileStore, resolve_config};
use clap::Parser;
use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Sandboxed package builds for eopkg recipes",
    long_about = None)]
pub struct Args {
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Enable debug messages
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Disable colored output
    #[arg(short = 'n', long, global = true)]
    pub no_color: bool,

    /// Build profile to use, defaults to main-x86_64
    #[arg(short = 'p', long, global = true,
        add = ArgValueCompleter::new(profile_completion))]
    pub profile: Option<String>,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum Action {
    /// Build the given package in a sandboxed root
    Build {
        /// Recipe to build, defaults to package.yml or pspec.xml in the
        /// current directory
        #[arg(value_name = "package.yml|pspec.xml")]
        recipe: Option<PathBuf>,
    },

    /// Interactively chroot into the package's build environment
    Chroot {
        /// Recipe whose environment to enter, defaults to package.yml or
        /// pspec.xml in the current directory
        #[arg(value_name = "package.yml|pspec.xml")]
        recipe: Option<PathBuf>,
    },

    /// Initialise a profile so that it can be used for builds
    Init {
        #[arg(value_name = "PROFILE",
            add = ArgValueCompleter::new(profile_completion))]
        profile: Option<String>,

        /// Automatically update the new image
        #[arg(short = 'u', long)]
        update: bool,
    },

    /// Update the base image of a profile
    #[command(alias = "up")]
    Update {
        #[arg(value_name = "PROFILE",
            add = ArgValueCompleter::new(profile_completion))]
        profile: Option<String>,
    },
}

impl Args {
    /// The profile named positionally by `init`/`update` wins over `-p`.
    pub fn requested_profile(&self) -> Option<String> {
        match &self.action {
            Some(Action::Init {
                profile: Some(profile),
                ..
            })
            | Some(Action::Update {
                profile: Some(profile),
            }) => Some(profile.trim().to_string()),
            _ => self.profile.clone(),
        }
    }
}

pub fn profile_completion(
    current: &std::ffi::OsStr,
) -> Vec<CompletionCandidate> {
    let Some(current) = current.to_str() else {
        return vec![];
    };

    let cli: Args = Args::parse();
    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(_) => return vec![],
    };

    let store = match ProfileStore::load(&config.profile_dirs) {
        Ok(store) => store,
        Err(_) => return vec![],
    };

    store
        .names()
        .into_iter()
        .filter(|name| name.starts_with(current))
        .map(CompletionCandidate::new)
        .collect()
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
