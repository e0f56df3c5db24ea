//! One external encoder invocation.
//!
//! Wraps a single ffmpeg child process: argument assembly per category,
//! spawn with stderr forwarded to the log, exit notification, and a
//! graceful-then-forceful terminate. The handle does not know whether an
//! exit was requested or a crash; the supervisor decides that from its own
//! state.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::config::RecorderCategory;

/// External encoder binary, resolved via PATH.
pub const ENCODER_BIN: &str = "ffmpeg";

/// Grace window between SIGTERM and the forceful kill.
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("ffmpeg not found - is it installed?")]
    FfmpegNotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the ffmpeg argument list for one segment.
pub(crate) fn build_args(
    source_url: &str,
    output: &Path,
    category: RecorderCategory,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-i".into(),
        source_url.into(),
    ];
    match category {
        RecorderCategory::Record => {
            args.extend(["-f", "mp4"].iter().map(OsString::from));
        }
        RecorderCategory::Stream => {
            // Short rolling window; ffmpeg prunes old .ts segments itself
            args.extend(
                [
                    "-f",
                    "hls",
                    "-hls_time",
                    "3",
                    "-hls_list_size",
                    "10",
                    "-hls_flags",
                    "delete_segments",
                ]
                .iter()
                .map(OsString::from),
            );
        }
        RecorderCategory::Audio => {
            args.extend(["-vn", "-acodec", "copy"].iter().map(OsString::from));
        }
        RecorderCategory::Image => {
            args.extend(["-vframes", "1"].iter().map(OsString::from));
        }
    }
    args.push(output.as_os_str().to_os_string());
    args
}

/// A running (or already exited) encoder process.
pub struct EncoderHandle {
    child: Child,
}

impl EncoderHandle {
    /// Spawn ffmpeg reading `source_url` and writing `output`.
    ///
    /// Stdin and stdout are discarded; stderr is piped and forwarded
    /// line-by-line to the log.
    pub fn spawn(
        source_url: &str,
        output: &Path,
        category: RecorderCategory,
    ) -> Result<Self, EncoderError> {
        let args = build_args(source_url, output, category);
        let mut child = Command::new(ENCODER_BIN)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfmpegNotFound
                } else {
                    EncoderError::Io(e)
                }
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Ok(Self { child })
    }

    /// Wait for the process to exit. Resolves with the exit status whether
    /// the process finished naturally, was killed, or crashed.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to stop: SIGTERM first so ffmpeg can finalize its
    /// output, a forceful kill after the grace window. Calling this on an
    /// already exited process is a no-op.
    pub async fn terminate(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(KILL_GRACE, self.child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    /// Terminate and reap, returning the exit status when available.
    pub async fn shutdown(&mut self) -> Option<ExitStatus> {
        self.terminate().await;
        self.child.wait().await.ok()
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("ffmpeg: {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_record_args() {
        let out = PathBuf::from("out/3-Jan-2024 10-30-05.mp4");
        let args = strings(&build_args("rtsp://cam/stream", &out, RecorderCategory::Record));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-loglevel",
                "warning",
                "-i",
                "rtsp://cam/stream",
                "-f",
                "mp4",
                "out/3-Jan-2024 10-30-05.mp4",
            ]
        );
    }

    #[test]
    fn test_stream_args_use_hls_rolling_window() {
        let out = PathBuf::from("out/cam.m3u8");
        let args = strings(&build_args("rtsp://cam/stream", &out, RecorderCategory::Stream));
        assert!(args.contains(&"hls".to_string()));
        assert!(args.contains(&"-hls_time".to_string()));
        assert!(args.contains(&"delete_segments".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out/cam.m3u8"));
    }

    #[test]
    fn test_audio_and_image_args() {
        let out = PathBuf::from("out/a.avi");
        let args = strings(&build_args("rtsp://cam/stream", &out, RecorderCategory::Audio));
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"copy".to_string()));

        let out = PathBuf::from("out/a.jpg");
        let args = strings(&build_args("rtsp://cam/stream", &out, RecorderCategory::Image));
        assert!(args.contains(&"-vframes".to_string()));
        assert!(args.contains(&"1".to_string()));
    }

    #[test]
    fn test_input_precedes_output() {
        let out = PathBuf::from("out.mp4");
        let args = strings(&build_args("src", &out, RecorderCategory::Record));
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_pos + 1], "src");
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }
}
