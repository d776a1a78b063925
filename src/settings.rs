use std::{path::Path, path::PathBuf, time::Duration};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

use crate::types::ScratchExtension;

/// Runtime settings.
///
/// Read from the built-in defaults, then the optional TOML file, then the
/// `VIDINFO__*` environment variables (e.g. `VIDINFO__USE_HTTPS=true`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The ffmpeg binary to run
    pub ffmpeg: String,
    pub provider_base_url: String,
    /// Endpoint of the provider API, used to request access tokens
    pub provider_api_url: String,
    pub provider_user_id: Option<String>,
    pub provider_user_key: Option<String>,
    pub token_lifetime_secs: u64,
    /// Hand `https://` URLs to ffmpeg as is. When false they are rewritten to
    /// `http://`, for ffmpeg builds without TLS support.
    pub use_https: bool,
    pub scratch_dir: Option<PathBuf>,
    pub scratch_extension: ScratchExtension,
    pub gallery_dir: PathBuf,
    /// Number of screen captures taken per asset
    pub screencaptures: u32,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_owned(),
            provider_base_url: "https://vid.ly".to_owned(),
            provider_api_url: "https://m.vid.ly/api/".to_owned(),
            provider_user_id: None,
            provider_user_key: None,
            token_lifetime_secs: 90,
            use_https: false,
            scratch_dir: None,
            scratch_extension: ScratchExtension::Mp4,
            gallery_dir: PathBuf::from("gallery"),
            screencaptures: 2,
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml));
        }

        builder
            .add_source(
                Environment::with_prefix("VIDINFO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .into_diagnostic()
            .wrap_err("Could not read configuration")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }
}
