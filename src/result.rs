use std::fmt::Display;

use miette::miette;

/// Reasons a single asset could not be processed during a run.
///
/// None of these abort a batch: the pipelines record them and move on to the
/// next asset, which stays pending for the next run.
#[derive(Debug)]
pub enum Error {
    /// No usable media URL could be derived from the asset's template.
    Resolution,

    /// The remote check answered with a status that is neither 2xx nor a
    /// followable redirect.
    Probe { url: String, status: u16 },

    /// The external tool ran but its output had nothing usable.
    Extraction { input: String },

    /// Downloading the media to a scratch file failed.
    Download { url: String, report: miette::Report },

    /// The external tool could not be started, or crashed.
    ToolInvocation(miette::Report),

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Miette(err) => err,
            Error::Download { url, report } => {
                report.wrap_err(format!("Could not download {url}"))
            }
            Error::ToolInvocation(report) => report.wrap_err("External tool failed"),
            err => miette!("{err}"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Resolution => write!(f, "No media URL could be resolved"),
            Error::Probe { url, status } => write!(f, "{url} answered with status {status}"),
            Error::Extraction { input } => write!(f, "Nothing usable in the tool output for {input}"),
            Error::Download { url, report } => write!(f, "Could not download {url}: {report}"),
            Error::ToolInvocation(report) => write!(f, "External tool failed: {report}"),
            Error::Miette(report) => write!(f, "{report}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether the failure is only "nothing to do for this asset".
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Resolution)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn err_msg(msg: &'static str) -> Error {
    Error::Miette(miette!(msg))
}

pub fn bail<T>(msg: &'static str) -> Result<T> {
    Err(err_msg(msg))
}
