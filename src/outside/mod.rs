mod command;
mod ffmpeg;
mod http;
mod vidly;

pub use ffmpeg::{numbered_output, CapturePlan, Ffmpeg, MediaProbeTool, FRAME_PLACEHOLDER};
pub use http::{Body, HeadResponse, Http, HttpClient};
pub use vidly::{NoCredentials, Tokenizer, Vidly};

#[cfg(test)]
pub use ffmpeg::parse_duration;
