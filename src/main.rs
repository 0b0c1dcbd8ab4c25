#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::result_map_unit_fn,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::use_debug,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

mod actions;
mod config;
mod error;
mod image;
mod logger;
mod pipeline;
mod recipe;
mod sandbox;
mod types;
mod util;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use config::{cli, resolve_config};
use log::{Log, debug};

pub fn main() -> Result<()> {
    let logger = logger::BuildLogger::new(log::LevelFilter::Trace)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    // Does not return when a completion was requested
    if std::env::var("COMPLETE").is_ok() {
        CompleteEnv::with_factory(cli::Args::command).complete();
        return Ok(());
    }

    let cli = cli::Args::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = resolve_config(cli.clone()).context("Resolving config")?;

    // Messages logged while resolving the config were held back until the
    // level was known.
    logger.set_level(config.log_level);
    logger.print_deferred();
    for (key, value) in config.entries() {
        debug!("{} = {} ({})", key, value, config.source_of(key));
    }

    let Some(action) = cli.action else {
        cli::Args::command()
            .print_help()
            .context("Printing help")?;
        return Ok(());
    };

    let result = match action {
        cli::Action::Build { recipe } => actions::build(&config, recipe),
        cli::Action::Chroot { recipe } => actions::chroot(&config, recipe),
        cli::Action::Init { update, .. } => {
            actions::init(&config, &config.profile, update)
        }
        cli::Action::Update { .. } => actions::update(&config, &config.profile),
    };

    logger.flush();
    result
}
