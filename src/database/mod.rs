mod sqlite;

use miette::Result;

pub use sqlite::Sqlite;

use crate::types::{AssetId, Capture, MediaAsset, NewCapture, SubmissionRecord};

/// Read and write access to the events, submissions and pictures the
/// pipelines work on.
///
/// Implementations are not expected to guard against concurrent pipeline
/// runs: callers **must** serialize runs themselves.
pub trait Store {
    /// Assets without a duration, oldest first.
    ///
    /// If a limit is given, return at most that many assets.
    fn pending_durations(&self, limit: Option<usize>) -> Result<Vec<MediaAsset>>;

    /// Assets with a duration and no picture at all, oldest first.
    fn pending_screencaptures(&self, limit: Option<usize>) -> Result<Vec<MediaAsset>>;

    /// Read the current state of an asset.
    fn asset(&self, id: AssetId) -> Result<Option<MediaAsset>>;

    /// Set the duration of an asset that does not have one yet.
    ///
    /// Return whether the value was written. An asset that already has a
    /// duration **must** be left untouched.
    fn set_duration(&self, id: AssetId, seconds: u64) -> Result<bool>;

    /// The submission to use for a provider tag: HD ones first, then the most
    /// recent.
    fn best_submission(&self, tag: &str) -> Result<Option<SubmissionRecord>>;

    fn count_captures(&self, id: AssetId) -> Result<usize>;

    /// Insert pictures in the given order, all or none of them.
    fn add_captures(&self, captures: &[NewCapture]) -> Result<Vec<i64>>;

    /// Pictures of an asset in gallery order, newest first.
    fn captures(&self, id: AssetId) -> Result<Vec<Capture>>;
}
