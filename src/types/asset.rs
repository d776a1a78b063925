use std::{collections::BTreeMap, path::PathBuf};

/// Identifier of an event row, the unit both pipelines work on.
pub type AssetId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,

    /// Anything that is not publicly listed (company only, contributors...)
    Restricted,
}

impl Visibility {
    pub fn from_privacy(privacy: &str) -> Self {
        if privacy.eq_ignore_ascii_case("public") {
            Visibility::Public
        } else {
            Visibility::Restricted
        }
    }

    pub fn as_privacy(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Restricted => "company",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub content: String,
}

/// An event whose video is hosted elsewhere.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub id: AssetId,
    pub title: String,
    pub template: Option<Template>,
    /// Named parameters rendered into the template
    pub template_env: BTreeMap<String, String>,
    pub visibility: Visibility,
    /// Playable duration in whole seconds, `None` until discovered
    pub duration: Option<u64>,
}

/// A submission of an asset to the video provider, identified by its tag.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub id: i64,
    pub asset_id: AssetId,
    pub tag: String,
    /// Source URL the provider transcoded from
    pub url: String,
    pub hd: bool,
    pub token_protection: bool,
    /// Unix timestamp of the submission
    pub submitted: i64,
}

/// A still image of an asset, as listed in its picture gallery.
#[derive(Debug, Clone)]
pub struct Capture {
    pub id: i64,
    pub asset_id: AssetId,
    pub file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub notes: String,
    pub created: i64,
}

#[derive(Debug, Clone)]
pub struct NewCapture {
    pub asset_id: AssetId,
    pub file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub notes: String,
}
