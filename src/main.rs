mod cli;
mod database;
mod fetcher;
mod io;
mod locator;
mod logging;
mod outside;
mod pipeline;
mod probe;
mod result;
mod settings;
#[cfg(test)]
mod testing;
mod types;

use clap::Parser;
use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, info};

use crate::{
    cli::{Args, Command},
    database::Sqlite,
    outside::{Ffmpeg, Http, NoCredentials, Tokenizer, Vidly},
    pipeline::{DurationPipeline, ScreenCapturePipeline, Services},
    settings::Settings,
};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_level.into())?;

    let settings = Settings::load(args.config.as_deref())?;

    if let Some(p) = args.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(p)
            .into_diagnostic()
            .wrap_err("Could not create database parent directories")?;
    }
    let db = Sqlite::open(&args.database)?;

    let ffmpeg = Ffmpeg::new(Some(settings.ffmpeg.as_str()))
        .map_err(miette::Report::from)
        .wrap_err("Could not find ffmpeg")?;
    let http = Http::new(settings.http_timeout())?;
    let tokenizer = load_tokenizer(&settings)?;

    let services = Services {
        store: &db,
        http: &http,
        tool: &ffmpeg,
        tokenizer: tokenizer.as_ref(),
        settings: &settings,
    };

    let report = match args.command {
        Command::Durations {
            save_locally,
            save_locally_some,
            batch,
        } => {
            let mode = cli::save_locally(save_locally, save_locally_some);
            info!("Looking for durations (save locally: {mode:?})");
            DurationPipeline::new(services, mode).run(batch.max)?
        }
        Command::Screencaptures { batch } => {
            info!("Taking screen captures");
            ScreenCapturePipeline::new(services).run(batch.max)?
        }
    };

    print!("{report}");
    Ok(())
}

/// Use the provider token API if credentials are configured
fn load_tokenizer(settings: &Settings) -> Result<Box<dyn Tokenizer>> {
    match (&settings.provider_user_id, &settings.provider_user_key) {
        (Some(user_id), Some(user_key)) => Ok(Box::new(Vidly::new(
            &settings.provider_api_url,
            user_id,
            user_key,
            settings.token_lifetime(),
            settings.http_timeout(),
        )?)),
        _ => {
            debug!("No provider credentials, token protected media will fail");
            Ok(Box::new(NoCredentials))
        }
    }
}
