use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::pipeline::SaveLocally;

macro_rules! arg_env {
    ($v:literal) => {
        concat!("VIDINFO_", $v)
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Find the duration of event videos hosted by a video provider, and take
/// preview screen captures of them.
///
/// Each run makes one pass over the events that still need work and prints a
/// report. Runs must not overlap.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// The TOML configuration file
    #[arg(long, global = true, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// The sqlite database holding the events
    #[arg(long, global = true, default_value = "vidinfo.sqlite", env = arg_env!("DATABASE"))]
    pub database: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info, env = arg_env!("LOG_LEVEL"))]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the duration of the events that do not have one
    Durations {
        /// Download every video before inspecting it
        #[arg(long, conflicts_with = "save_locally_some")]
        save_locally: bool,

        /// Download only the videos of events that are not public
        #[arg(long)]
        save_locally_some: bool,

        #[command(flatten)]
        batch: Batch,
    },

    /// Take the preview pictures of the events that have a duration and no
    /// picture
    Screencaptures {
        #[command(flatten)]
        batch: Batch,
    },
}

#[derive(ClapArgs, Debug)]
pub struct Batch {
    /// Process at most this many events
    #[arg(long, env = arg_env!("MAX"))]
    pub max: Option<usize>,
}

pub fn save_locally(all: bool, some: bool) -> SaveLocally {
    match (all, some) {
        (true, _) => SaveLocally::All,
        (false, true) => SaveLocally::Restricted,
        (false, false) => SaveLocally::Never,
    }
}
