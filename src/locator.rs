use std::sync::OnceLock;

use miette::miette;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::{
    database::Store,
    outside::Tokenizer,
    result::Result,
    types::{Candidate, MediaAsset, Visibility},
};

/// How an asset's template says its media is hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Hosted by the video provider under this tag
    ProviderTag(String),

    /// The template embeds this media URL directly
    EmbeddedUrl(String),

    Unrecognized,
}

impl MediaSource {
    /// Classify an asset from its template name and parameters.
    pub fn of(asset: &MediaAsset) -> Self {
        let Some(template) = &asset.template else {
            return MediaSource::Unrecognized;
        };
        let param = |key: &str| {
            asset
                .template_env
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        if template.name.to_lowercase().contains("vid.ly") {
            return match param("tag") {
                Some(tag) => MediaSource::ProviderTag(tag.to_owned()),
                None => MediaSource::Unrecognized,
            };
        }

        if let Some(url) = param("url") {
            return MediaSource::EmbeddedUrl(url.to_owned());
        }

        asset
            .template_env
            .values()
            .find_map(|value| embedded_src(value))
            .map_or(MediaSource::Unrecognized, MediaSource::EmbeddedUrl)
    }
}

/// The first `src="http..."` attribute in a markup snippet.
fn embedded_src(markup: &str) -> Option<String> {
    static SRC_RE: OnceLock<Regex> = OnceLock::new();
    let re = SRC_RE.get_or_init(|| Regex::new(r#"src=["'](https?://[^"']+)["']"#).unwrap());

    re.captures(markup).map(|cap| cap[1].to_owned())
}

/// Derives the media URLs to probe for an asset.
pub struct MediaLocator<'a> {
    store: &'a dyn Store,
    tokenizer: &'a dyn Tokenizer,
    provider_base_url: &'a str,
}

impl<'a> MediaLocator<'a> {
    pub fn new(
        store: &'a dyn Store,
        tokenizer: &'a dyn Tokenizer,
        provider_base_url: &'a str,
    ) -> Self {
        Self {
            store,
            tokenizer,
            provider_base_url,
        }
    }

    /// The URLs to try for an asset, best first. Empty if the template is
    /// not one we know how to handle.
    ///
    /// Token protected tags of restricted assets get a fresh token from the
    /// [`Tokenizer`], which may make a request to the provider API.
    pub fn candidates(&self, asset: &MediaAsset) -> Result<Vec<Candidate>> {
        match MediaSource::of(asset) {
            MediaSource::ProviderTag(tag) => Ok(vec![self.provider_candidate(asset, &tag)?]),
            MediaSource::EmbeddedUrl(url) => Ok(vec![Candidate {
                name: url_stem(&url),
                url,
                token: None,
            }]),
            MediaSource::Unrecognized => Ok(vec![]),
        }
    }

    fn provider_candidate(&self, asset: &MediaAsset, tag: &str) -> Result<Candidate> {
        let submission = self.store.best_submission(tag)?;
        let hd = submission.as_ref().is_some_and(|s| s.hd);

        let base = self.provider_base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{tag}"))
            .map_err(|e| miette!("Invalid provider URL for tag {tag}: {e}"))?;
        url.query_pairs_mut()
            .append_pair("content", "video")
            .append_pair("format", if hd { "hd_mp4" } else { "mp4" });

        // Public delivery works without the token even for protected tags
        let needs_token = submission.as_ref().is_some_and(|s| s.token_protection)
            && asset.visibility == Visibility::Restricted;
        let token = if needs_token {
            debug!("Tag {tag} is token protected");
            self.tokenizer.token(tag)?
        } else {
            None
        };

        if let Some(token) = &token {
            url.query_pairs_mut().append_pair("token", token);
        }

        Ok(Candidate {
            url: url.into(),
            token,
            name: tag.to_owned(),
        })
    }
}

/// The file name of a URL without its extension, for naming local copies.
fn url_stem(url: &str) -> String {
    let stem = Url::parse(url).ok().and_then(|url| {
        let last = url.path_segments()?.last()?.to_owned();
        let stem = last.split('.').next().unwrap_or_default().to_owned();
        (!stem.is_empty()).then_some(stem)
    });

    stem.unwrap_or_else(|| "media".to_owned())
}
