use std::io;

use ballot_log::{Formatting, MaybeSystemTime, TargetsExt};
use log::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, prelude::*};

use crate::{config::config_file::LogSettings, error::ConfigError};

pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Builds the target filter: ballot crates at the configured level, tags on top.
pub fn log_targets(settings: &LogSettings) -> Targets {
    settings.tags.iter().fold(
        Targets::new()
            .with_default(DEFAULT_LEVEL)
            .with_ballot_targets(settings.level.unwrap_or(DEFAULT_LEVEL)),
        |targets, (target, level)| targets.with_target(target.clone(), *level),
    )
}

/// Installs the global subscriber. `RUST_LOG` overrides the settings. Fails if a
/// subscriber is installed already.
pub fn initialize_logging(settings: Option<&LogSettings>) -> Result<(), ConfigError> {
    let settings = settings.cloned().unwrap_or_default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .event_format(Formatting(MaybeSystemTime(settings.timestamps))),
        )
        .with(log_targets(&settings).with_env())
        .try_init()?;

    Ok(())
}
