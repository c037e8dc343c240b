use crossbeam_channel::{Receiver, RecvTimeoutError};
use once_cell::sync::Lazy;
use regex::Regex;
use shared_child::SharedChild;
use std::{
    collections::VecDeque,
    io::{BufReader, Read},
    path::Path,
    process::{Command, Stdio},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::domain::AudioInfo;
use crate::error::{MergeError, Result};
use crate::merger::{CommandRunner, ExecuteHandler};

/// Lines of stderr kept for the outcome report
const OUTPUT_TAIL_LINES: usize = 12;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (?P<duration>\d{2}:\d{2}:\d{2}\.\d{2})").unwrap());

static AUDIO_STREAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Stream #0:\d+.*?: Audio: (?P<codec>[\w-]+)[^,]*,\s*(?P<rate>\d+) Hz").unwrap()
});

/// FFmpeg binary wrapper, the process runner behind [`crate::merger::Merger`]
pub struct FFmpeg {
    ffmpeg_path: String,
}

impl FFmpeg {
    /// Locate FFmpeg using the default search order
    pub fn new() -> Result<Self> {
        let ffmpeg_path = Self::find_ffmpeg()?;
        Ok(Self { ffmpeg_path })
    }

    /// Use an explicit binary, skipping the search
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Find FFmpeg binary
    ///
    /// Search priority (highest to lowest):
    /// 1. AUDIOMERGE_FFMPEG_PATH environment variable
    /// 2. `ffmpeg` bundled next to this executable
    /// 3. System PATH
    ///
    /// Set `AUDIOMERGE_FFMPEG_VERIFY=1` to check a bundled binary before use.
    fn find_ffmpeg() -> Result<String> {
        if let Ok(explicit_path) = std::env::var("AUDIOMERGE_FFMPEG_PATH") {
            let path = Path::new(&explicit_path);
            if path.is_file() {
                tracing::info!(path = %explicit_path, "using FFmpeg from AUDIOMERGE_FFMPEG_PATH");
                return Ok(explicit_path);
            }
            tracing::warn!(path = %explicit_path, "AUDIOMERGE_FFMPEG_PATH set but invalid");
            return Err(MergeError::FfmpegNotFound);
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        if let Some(dir) = exe_dir {
            let bundled = if cfg!(windows) {
                dir.join("ffmpeg.exe")
            } else {
                dir.join("ffmpeg")
            };

            if bundled.is_file() {
                if std::env::var("AUDIOMERGE_FFMPEG_VERIFY").unwrap_or_default() == "1" {
                    if let Err(e) = Self::verify_bundled_ffmpeg(&bundled) {
                        tracing::warn!(error = %e, "bundled FFmpeg verification failed");
                        return Err(MergeError::FfmpegNotFound);
                    }
                }

                let bundled_path = bundled.to_string_lossy().to_string();
                tracing::info!(path = %bundled_path, "using bundled FFmpeg");
                return Ok(bundled_path);
            }
        }

        if let Ok(path) = which::which("ffmpeg") {
            let path_str = path.to_string_lossy().to_string();
            tracing::info!(path = %path_str, "using FFmpeg from system PATH");
            return Ok(path_str);
        }

        Err(MergeError::FfmpegNotFound)
    }

    fn verify_bundled_ffmpeg(path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::metadata(path)?.permissions();
            if permissions.mode() & 0o111 == 0 {
                return Err(MergeError::InvalidArgument(
                    "Bundled FFmpeg is not executable".to_string(),
                ));
            }
        }

        if Self::reports_version(path.as_os_str()) {
            Ok(())
        } else {
            Err(MergeError::InvalidArgument(
                "Binary does not appear to be FFmpeg".to_string(),
            ))
        }
    }

    fn reports_version(program: &std::ffi::OsStr) -> bool {
        match Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => {
                output.status.success()
                    && String::from_utf8_lossy(&output.stdout).contains("ffmpeg version")
            }
            Err(e) => {
                tracing::debug!(error = %e, "could not run FFmpeg");
                false
            }
        }
    }

    /// Read duration and first audio stream parameters of a file.
    ///
    /// Missing or unreadable files yield an empty [`AudioInfo`]; the merge
    /// itself is what reports them.
    pub fn get_audio_info(&self, audio_path: &str) -> Result<AudioInfo> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-i", audio_path])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        Ok(Self::parse_audio_info(&String::from_utf8_lossy(&output.stderr)))
    }

    fn parse_audio_info(stderr: &str) -> AudioInfo {
        let duration = DURATION_RE
            .captures(stderr)
            .map(|cap| cap["duration"].to_string());
        let duration_seconds = duration.as_deref().and_then(duration_to_seconds);

        let stream = AUDIO_STREAM_RE.captures(stderr);
        let codec = stream.as_ref().map(|cap| cap["codec"].to_string());
        let sample_rate = stream.as_ref().and_then(|cap| cap["rate"].parse().ok());

        AudioInfo {
            duration,
            duration_seconds,
            codec,
            sample_rate,
        }
    }
}

impl CommandRunner for FFmpeg {
    fn probe(&self) -> bool {
        Self::reports_version(self.ffmpeg_path.as_ref())
    }

    fn execute(
        &self,
        args: &[String],
        cancelled: &AtomicBool,
        handler: &mut dyn ExecuteHandler,
    ) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = SharedChild::spawn(&mut command)
            .map_err(|e| MergeError::ExecutionFailure(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let stderr = child.take_stderr();
        let reader = thread::spawn(move || {
            if let Some(stderr) = stderr {
                read_lines(stderr, |line| tx.send(line).is_ok());
            }
        });

        handler.on_start();

        let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        if !pump_lines(&rx, cancelled, handler, &mut tail) {
            // Kill first so the reader sees EOF and can be joined
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            tracing::info!("merge cancelled, FFmpeg killed");
            return Err(MergeError::Cancelled);
        }

        let status = child.wait()?;
        let _ = reader.join();

        let output = Vec::from(tail).join("\n");
        if status.success() {
            handler.on_success(&output);
        } else if output.is_empty() {
            handler.on_failure(&format!("ffmpeg exited with {}", status));
        } else {
            handler.on_failure(&output);
        }

        handler.on_finish();
        Ok(())
    }
}

/// Forward stderr lines to the handler until the stream closes, keeping the
/// last [`OUTPUT_TAIL_LINES`] in `tail`.
///
/// Returns false if cancellation was requested first.
fn pump_lines(
    rx: &Receiver<String>,
    cancelled: &AtomicBool,
    handler: &mut dyn ExecuteHandler,
    tail: &mut VecDeque<String>,
) -> bool {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                handler.on_progress(&line);
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

/// Split a stream on `\r` or `\n`; FFmpeg rewrites its status line with `\r`.
/// Stops early when `sink` returns false.
fn read_lines<R: Read>(reader: R, mut sink: impl FnMut(String) -> bool) {
    let mut buf: Vec<u8> = Vec::new();

    for byte in BufReader::new(reader).bytes() {
        let Ok(byte) = byte else { break };
        match byte {
            b'\r' | b'\n' => {
                if buf.is_empty() {
                    continue;
                }
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                buf.clear();
                if !line.is_empty() && !sink(line) {
                    return;
                }
            }
            other => buf.push(other),
        }
    }

    if !buf.is_empty() {
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        if !line.is_empty() {
            sink(line);
        }
    }
}

/// `HH:MM:SS.xx` to seconds
pub fn duration_to_seconds(duration: &str) -> Option<f64> {
    let parts: Vec<&str> = duration.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
