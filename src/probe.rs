use tracing::debug;
use url::Url;

use crate::{
    outside::HttpClient,
    result::{Error, Result},
};

/// Where a probed URL led.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Status of the first request
    pub status: u16,
    pub final_url: String,
    /// Whether `final_url` answered 2xx, so that it can be read remotely
    pub direct: bool,
}

/// Checks that a candidate URL leads somewhere, with metadata-only requests.
pub struct RemoteProbe<'a> {
    http: &'a dyn HttpClient,
}

impl<'a> RemoteProbe<'a> {
    pub fn new(http: &'a dyn HttpClient) -> Self {
        Self { http }
    }

    /// Check `url`, following at most one redirect.
    ///
    /// A redirect whose target does not answer 2xx is still a success: the
    /// media has to be downloaded from the target instead of read remotely.
    /// Any other status is an [`Error::Probe`].
    pub fn probe(&self, url: &str) -> Result<ProbeResult> {
        let res = self.http.head(url)?;
        let status = res.status;

        match (status, res.location) {
            (200..=299, _) => Ok(ProbeResult {
                status,
                final_url: url.to_owned(),
                direct: true,
            }),
            (300..=399, Some(location)) => {
                let target = resolve_location(url, &location);
                debug!("{url} redirects to {target}");

                let target_status = self.http.head(&target)?.status;
                let direct = (200..300).contains(&target_status);
                if !direct {
                    debug!("{target} answered {target_status}, it will need a download");
                }

                Ok(ProbeResult {
                    status,
                    final_url: target,
                    direct,
                })
            }
            _ => {
                debug!("{url} answered with status {status}");
                Err(Error::Probe {
                    url: url.to_owned(),
                    status,
                })
            }
        }
    }
}

/// Resolve a possibly relative `Location` header against the requested URL.
fn resolve_location(url: &str, location: &str) -> String {
    Url::parse(url)
        .and_then(|base| base.join(location))
        .map_or_else(|_| location.to_owned(), String::from)
}
