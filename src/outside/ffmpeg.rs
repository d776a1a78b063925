use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

use crate::result::Result;

use super::command::{assert_success_command, run_command, Streams, FFMPEG};

/// Placeholder replaced by the frame number in screen capture output paths.
pub const FRAME_PLACEHOLDER: &str = "%d";

/// Interface to the external program that inspects media and extracts frames.
///
/// `input` is either a URL or a local file path.
pub trait MediaProbeTool {
    /// Find the playable duration of the media, in whole seconds.
    ///
    /// Return `Ok(None)` if the tool ran but reported no duration.
    fn duration(&self, input: &str) -> Result<Option<u64>>;

    /// Write `plan.count` frames of the media as images.
    ///
    /// `output_template` contains [`FRAME_PLACEHOLDER`], which the tool
    /// replaces by the frame number, starting at 1.
    fn screencaptures(&self, input: &str, plan: &CapturePlan, output_template: &Path)
        -> Result<()>;
}

/// Where in the media the frames of a screen capture run are taken.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePlan {
    pub count: u32,
    /// Offset of the first frame, in seconds
    pub first: f64,
    /// Seconds between two frames
    pub interval: f64,
}

impl CapturePlan {
    /// Split the media in `count` equal parts and take the middle frame of each.
    ///
    /// Return `None` if there is nothing to capture.
    pub fn evenly_spaced(duration: u64, count: u32) -> Option<Self> {
        if duration == 0 || count == 0 {
            return None;
        }

        let interval = duration as f64 / f64::from(count);
        Some(Self {
            count,
            first: interval / 2.,
            interval,
        })
    }

    pub fn offsets(&self) -> Vec<f64> {
        (0..self.count)
            .map(|i| self.first + f64::from(i) * self.interval)
            .collect()
    }
}

/// The path of frame `n` for an output template.
pub fn numbered_output(output_template: &Path, n: u32) -> PathBuf {
    let template = output_template.to_string_lossy();
    PathBuf::from(template.replacen(FRAME_PLACEHOLDER, &n.to_string(), 1))
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    /// Verify that the `ffmpeg` binary is reachable
    pub fn new(program: Option<&str>) -> Result<Self> {
        let program = program.unwrap_or(FFMPEG).to_owned();
        assert_success_command(&program, |cmd| cmd.arg("-version"))?;

        Ok(Self { program })
    }
}

impl MediaProbeTool for Ffmpeg {
    fn duration(&self, input: &str) -> Result<Option<u64>> {
        // Without an output file ffmpeg exits with an error status, but only
        // after describing the input on stderr, which is all we need
        let res = run_command(
            &self.program,
            |cmd| cmd.arg("-hide_banner").args([OsStr::new("-i"), OsStr::new(input)]),
            Streams::STDERR,
        )?;

        let stderr = String::from_utf8_lossy(&res.stderr);
        Ok(parse_duration(&stderr))
    }

    fn screencaptures(
        &self,
        input: &str,
        plan: &CapturePlan,
        output_template: &Path,
    ) -> Result<()> {
        assert_success_command(&self.program, |cmd| {
            cmd.args(["-hide_banner", "-loglevel", "error"])
                .arg("-y")
                .args(["-ss", &format!("{:.3}", plan.first)])
                .args([OsStr::new("-i"), OsStr::new(input)])
                .args(["-vf", &format!("fps=1/{:.3}", plan.interval)])
                .args(["-frames:v", &plan.count.to_string()])
                .args(["-q:v", "2"])
                .arg(output_template)
        })
    }
}

/// Extract the duration reported by ffmpeg on its diagnostic output.
///
/// Fractions of a second are dropped: `00:10:31.52` is 631 seconds.
pub fn parse_duration(output: &str) -> Option<u64> {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = DURATION_RE
        .get_or_init(|| Regex::new(r"Duration: *(\d+):(\d{2}):(\d{2})(?:\.\d+)?").unwrap());

    let cap = re.captures(output)?;
    let part = |i| cap.get(i)?.as_str().parse::<u64>().ok();

    Some(part(1)? * 3600 + part(2)? * 60 + part(3)?)
}
