use std::process::{Command, Output, Stdio};

use bitflags::bitflags;
use miette::miette;
use tracing::{debug, enabled, trace, Level};

use crate::result::{Error, Result};

pub const FFMPEG: &str = "ffmpeg";

bitflags! {
    /// Which standard streams of a child process to keep.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Streams: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
/// No timeout is enforced.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Streams,
) -> Result<Output> {
    let is_debug = enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Streams::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Streams::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Streams::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = cmd
        .output()
        .map_err(|err| Error::ToolInvocation(miette!("Could not run {program}: {err}")))?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Streams::STDERR)?;
    if res.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&res.stderr);
        Err(Error::ToolInvocation(miette!(
            "{program} did run but was not successful. Here is its stderr: {stderr}"
        )))
    }
}
