use crate::io::ScratchFile;

/// A media URL worth probing for an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    /// Access token already appended to `url`, if any
    pub token: Option<String>,
    /// Stem used to name a local copy (the provider tag or the URL file stem)
    pub name: String,
}

/// Where the external tool should read an asset's media from.
///
/// Recomputed on every run. When the media had to be downloaded, the scratch
/// file lives as long as this value.
#[derive(Debug)]
pub struct ResolvedLocation {
    pub url: String,
    pub token: Option<String>,
    pub local: Option<ScratchFile>,
}

impl ResolvedLocation {
    pub fn remote(url: String, token: Option<String>) -> Self {
        Self {
            url,
            token,
            local: None,
        }
    }

    /// The locator to hand to the external tool: the local path if there is
    /// one, the URL otherwise.
    pub fn input(&self) -> String {
        match &self.local {
            Some(file) => file.path().display().to_string(),
            None => self.url.clone(),
        }
    }
}
