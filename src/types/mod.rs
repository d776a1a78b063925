mod asset;
mod extension;
mod location;

pub use asset::{AssetId, Capture, MediaAsset, NewCapture, SubmissionRecord, Template, Visibility};
pub use extension::ScratchExtension;
pub use location::{Candidate, ResolvedLocation};
