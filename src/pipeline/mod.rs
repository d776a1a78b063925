mod duration;
mod screencapture;

use std::fmt::Display;

use tracing::{debug, warn};

pub use duration::DurationPipeline;
pub use screencapture::ScreenCapturePipeline;

use crate::{
    database::Store,
    fetcher::LocalFallbackFetcher,
    locator::MediaLocator,
    outside::{HttpClient, MediaProbeTool, Tokenizer},
    probe::RemoteProbe,
    result::{Error, Result},
    settings::Settings,
    types::{AssetId, Candidate, MediaAsset, ResolvedLocation, Visibility},
};

/// When to download media before handing it to the external tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveLocally {
    /// Only when the media cannot be read remotely
    #[default]
    Never,

    /// Always
    All,

    /// For restricted assets only
    Restricted,
}

impl SaveLocally {
    pub fn applies_to(self, visibility: Visibility) -> bool {
        match self {
            SaveLocally::Never => false,
            SaveLocally::All => true,
            SaveLocally::Restricted => visibility == Visibility::Restricted,
        }
    }
}

/// The collaborators both pipelines work with.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub store: &'a dyn Store,
    pub http: &'a dyn HttpClient,
    pub tool: &'a dyn MediaProbeTool,
    pub tokenizer: &'a dyn Tokenizer,
    pub settings: &'a Settings,
}

/// Outcome of a pipeline run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub considered: usize,
    pub succeeded: Vec<AssetId>,
    pub skipped: Vec<AssetId>,
    pub failed: Vec<(AssetId, Error)>,
}

impl RunReport {
    fn record(&mut self, id: AssetId, outcome: Result<bool>) {
        self.considered += 1;
        match outcome {
            Ok(true) => self.succeeded.push(id),
            Ok(false) => self.skipped.push(id),
            Err(err) if err.is_skip() => {
                debug!("Event {id}: {err}");
                self.skipped.push(id);
            }
            Err(err) => {
                warn!("Event {id} failed: {err}");
                self.failed.push((id, err));
            }
        }
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} considered, {} succeeded, {} skipped, {} failed",
            self.considered,
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for (id, err) in &self.failed {
            writeln!(f, "\tevent {id}: {err}")?;
        }
        Ok(())
    }
}

/// Turns an asset into something the external tool can read:
/// locate, probe, then download if needed.
struct Resolver<'a> {
    locator: MediaLocator<'a>,
    probe: RemoteProbe<'a>,
    fetcher: LocalFallbackFetcher<'a>,
    use_https: bool,
}

impl<'a> Resolver<'a> {
    fn new(services: Services<'a>) -> Self {
        let settings = services.settings;
        Self {
            locator: MediaLocator::new(
                services.store,
                services.tokenizer,
                &settings.provider_base_url,
            ),
            probe: RemoteProbe::new(services.http),
            fetcher: LocalFallbackFetcher::new(
                services.http,
                settings.scratch_dir.as_deref(),
                settings.scratch_extension,
            ),
            use_https: settings.use_https,
        }
    }

    fn candidates(&self, asset: &MediaAsset) -> Result<Vec<Candidate>> {
        let candidates = self.locator.candidates(asset)?;
        if candidates.is_empty() {
            return Err(Error::Resolution);
        }
        Ok(candidates)
    }

    fn resolve(&self, candidate: &Candidate, save_locally: bool) -> Result<ResolvedLocation> {
        let probed = self.probe.probe(&candidate.url)?;

        if save_locally || !probed.direct {
            let file = self.fetcher.fetch(&probed.final_url, &candidate.name)?;
            return Ok(ResolvedLocation {
                url: probed.final_url,
                token: candidate.token.clone(),
                local: Some(file),
            });
        }

        let url = if self.use_https {
            probed.final_url
        } else {
            plain_http(probed.final_url)
        };
        Ok(ResolvedLocation::remote(url, candidate.token.clone()))
    }
}

fn plain_http(url: String) -> String {
    match url.strip_prefix("https://") {
        Some(rest) => format!("http://{rest}"),
        None => url,
    }
}

/// Try every candidate in turn until `f` succeeds, returning the last error
/// if none does.
fn first_success<T>(
    candidates: &[Candidate],
    mut f: impl FnMut(&Candidate) -> Result<T>,
) -> Result<T> {
    let mut last_err = Error::Resolution;
    for candidate in candidates {
        match f(candidate) {
            Ok(res) => return Ok(res),
            Err(err) => {
                debug!("Candidate {} failed: {err}", candidate.url);
                last_err = err;
            }
        }
    }
    Err(last_err)
}
