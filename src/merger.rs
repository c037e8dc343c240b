use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::command::build_merge_command;
use crate::domain::{MergeOutcome, MergeRequest, MergeSummary};
use crate::error::{MergeError, Result, NOT_SUPPORTED_REASON};
use crate::fs::normalize_path;

/// Callbacks from an external process execution.
///
/// `on_start` comes first, `on_finish` last. Exactly one of `on_success` or
/// `on_failure` is expected in between.
pub trait ExecuteHandler {
    fn on_start(&mut self);
    fn on_progress(&mut self, line: &str);
    fn on_success(&mut self, output: &str);
    fn on_failure(&mut self, output: &str);
    fn on_finish(&mut self);
}

/// Something that can run FFmpeg with a list of argument tokens
pub trait CommandRunner: Send + Sync {
    /// One-time check whether the binary can run on this host
    fn probe(&self) -> bool;

    /// Run the binary with `args`, reporting through `handler`.
    ///
    /// A process that ran and failed is reported via `on_failure`, not as an
    /// `Err`. `Err` is for failures to run at all, and for cancellation.
    fn execute(
        &self,
        args: &[String],
        cancelled: &AtomicBool,
        handler: &mut dyn ExecuteHandler,
    ) -> Result<()>;
}

/// Receives the outcome of a merge. Every method defaults to a no-op.
///
/// A request produces at most one `on_started` followed by exactly one of
/// `on_failure` or `on_complete`.
pub trait MergeListener {
    fn on_started(&mut self) {}

    fn on_progress(&mut self, _line: &str) {}

    fn on_failure(&mut self, _reason: &str) {}

    fn on_complete(&mut self) {}
}

impl MergeListener for () {}

/// Collects outcomes in delivery order
impl MergeListener for Vec<MergeOutcome> {
    fn on_started(&mut self) {
        self.push(MergeOutcome::Started);
    }

    fn on_failure(&mut self, reason: &str) {
        self.push(MergeOutcome::Failed(reason.to_string()));
    }

    fn on_complete(&mut self) {
        self.push(MergeOutcome::Completed);
    }
}

/// Bridges the runner's callbacks onto a listener.
///
/// Start and progress pass straight through. The terminal event is held back
/// so the merger can emit exactly one of failure or completion.
struct DispatchHandler<'a> {
    listener: &'a mut dyn MergeListener,
    failure: Option<String>,
    finished: bool,
}

impl ExecuteHandler for DispatchHandler<'_> {
    fn on_start(&mut self) {
        self.listener.on_started();
    }

    fn on_progress(&mut self, line: &str) {
        tracing::trace!(line, "ffmpeg progress");
        self.listener.on_progress(line);
    }

    fn on_success(&mut self, output: &str) {
        tracing::debug!(output_len = output.len(), "ffmpeg reported success");
    }

    fn on_failure(&mut self, output: &str) {
        tracing::warn!("ffmpeg failed with output: {}", output);
        if self.failure.is_none() {
            self.failure = Some(output.to_string());
        }
    }

    fn on_finish(&mut self) {
        self.finished = true;
    }
}

/// Releases an output path claim on drop
struct OutputClaim<'a> {
    in_flight: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for OutputClaim<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.path);
    }
}

/// Merges audio files through an external FFmpeg runner.
///
/// Build one per process and share it by reference. The capability flag is
/// fixed at construction.
pub struct Merger<R> {
    runner: R,
    supported: bool,
    script_dir: PathBuf,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl<R: CommandRunner> Merger<R> {
    pub fn new(runner: R, supported: bool, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            supported,
            script_dir: script_dir.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Probe the runner once and keep the answer for the merger's lifetime
    pub fn load(runner: R, script_dir: impl Into<PathBuf>) -> Self {
        let supported = runner.probe();
        if !supported {
            tracing::warn!("FFmpeg not supported on this device");
        }
        Self::new(runner, supported, script_dir)
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Merge `request.input_paths` into `request.output_path`.
    ///
    /// Any existing output file is deleted first. The listener sees
    /// `on_started` once the process runs, then exactly one of `on_failure`
    /// or `on_complete`. Failures before dispatch only produce `on_failure`.
    pub fn merge(
        &self,
        request: &MergeRequest,
        cancelled: &AtomicBool,
        listener: &mut dyn MergeListener,
    ) -> Result<MergeSummary> {
        if !self.supported {
            listener.on_failure(NOT_SUPPORTED_REASON);
            return Err(MergeError::CapabilityUnsupported);
        }

        let started_at = Instant::now();
        match self.dispatch(request, cancelled, listener) {
            Ok(()) => {
                let summary = summarize(request, started_at);
                tracing::info!(
                    output = %summary.file_path,
                    inputs = summary.input_count,
                    elapsed = summary.elapsed_secs,
                    "merge completed"
                );
                listener.on_complete();
                Ok(summary)
            }
            Err(e) => {
                listener.on_failure(&e.to_string());
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        request: &MergeRequest,
        cancelled: &AtomicBool,
        listener: &mut dyn MergeListener,
    ) -> Result<()> {
        // Nothing on disk is touched once cancellation is requested
        if cancelled.load(Ordering::Relaxed) {
            return Err(MergeError::Cancelled);
        }

        let _claim = self.claim_output(&request.output_path)?;

        // The script lives until the runner returns
        let prepared = build_merge_command(request, &self.script_dir)?;
        tracing::info!(
            strategy = %request.strategy,
            inputs = request.input_paths.len(),
            script = ?prepared.script_path(),
            "command: ffmpeg {}",
            prepared.args.join(" ")
        );

        let mut handler = DispatchHandler {
            listener,
            failure: None,
            finished: false,
        };
        self.runner.execute(&prepared.args, cancelled, &mut handler)?;

        match handler.failure {
            Some(reason) => Err(MergeError::ExecutionFailure(reason)),
            None if handler.finished => Ok(()),
            None => Err(MergeError::ExecutionFailure(
                "FFmpeg exited without reporting completion".to_string(),
            )),
        }
    }

    fn claim_output(&self, output_path: &str) -> Result<OutputClaim<'_>> {
        let path = normalize_path(output_path);
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if !set.insert(path.clone()) {
            return Err(MergeError::OutputBusy(output_path.to_string()));
        }

        Ok(OutputClaim {
            in_flight: &self.in_flight,
            path,
        })
    }
}

fn summarize(request: &MergeRequest, started_at: Instant) -> MergeSummary {
    let output = Path::new(&request.output_path);
    MergeSummary {
        file_name: output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output")
            .to_string(),
        file_path: request.output_path.clone(),
        strategy: request.strategy,
        input_count: request.input_paths.len(),
        output_size: std::fs::metadata(output).map(|m| m.len()).unwrap_or(0),
        elapsed_secs: started_at.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        /// Failure text followed by finish, as the upstream wrapper reports it
        FailThenFinish,
        SpawnError,
        Silent,
    }

    struct FakeRunner {
        supported: bool,
        behavior: Behavior,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Vec<String>, Option<String>)>>,
    }

    impl FakeRunner {
        fn new(supported: bool, behavior: Behavior) -> Self {
            Self {
                supported,
                behavior,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn probe(&self) -> bool {
            self.supported
        }

        fn execute(
            &self,
            args: &[String],
            _cancelled: &AtomicBool,
            handler: &mut dyn ExecuteHandler,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            // Capture the script while it still exists
            let script = args
                .iter()
                .position(|a| a == "concat")
                .and_then(|_| args.get(5))
                .and_then(|p| std::fs::read_to_string(p).ok());
            self.seen.lock().unwrap().push((args.to_vec(), script));

            match self.behavior {
                Behavior::Succeed => {
                    handler.on_start();
                    handler.on_progress("size=  10kB time=00:00:01.00");
                    handler.on_success("done");
                    handler.on_finish();
                }
                Behavior::Fail => {
                    handler.on_start();
                    handler.on_failure("Invalid data found when processing input");
                }
                Behavior::FailThenFinish => {
                    handler.on_start();
                    handler.on_failure("/a.m4a: No such file or directory");
                    handler.on_finish();
                }
                Behavior::SpawnError => {
                    return Err(MergeError::ExecutionFailure(
                        "No such file or directory (os error 2)".into(),
                    ));
                }
                Behavior::Silent => {}
            }
            Ok(())
        }
    }

    fn cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_unsupported_fails_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");
        std::fs::write(&output, b"old").unwrap();
        let script_dir = dir.path().join("scripts");

        let merger = Merger::load(FakeRunner::new(false, Behavior::Succeed), &script_dir);
        let request = MergeRequest::new(["/a.m4a", "/b.m4a"], output.to_string_lossy(), true);
        let mut events = Vec::new();

        let err = merger.merge(&request, &cancelled(), &mut events).unwrap_err();

        assert!(matches!(err, MergeError::CapabilityUnsupported));
        assert_eq!(events, vec![MergeOutcome::Failed("Not supported on this device.".into())]);
        assert_eq!(merger.runner.calls.load(Ordering::SeqCst), 0);
        assert!(!script_dir.exists());
        assert!(output.exists());
    }

    #[test]
    fn test_cancelled_before_dispatch_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");
        std::fs::write(&output, b"old").unwrap();
        let script_dir = dir.path().join("scripts");

        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), &script_dir);
        let request = MergeRequest::new(["/a.m4a", "/b.m4a"], output.to_string_lossy(), true);
        let mut events = Vec::new();

        let err = merger.merge(&request, &AtomicBool::new(true), &mut events).unwrap_err();

        assert!(matches!(err, MergeError::Cancelled));
        assert_eq!(events, vec![MergeOutcome::Failed("Merge cancelled by user".into())]);
        assert_eq!(merger.runner.calls.load(Ordering::SeqCst), 0);
        assert!(!script_dir.exists());
        assert_eq!(std::fs::read(&output).unwrap(), b"old");
    }

    #[test]
    fn test_concat_merge_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());
        let request = MergeRequest::new(["/a.m4a", "/b.m4a"], "/out.m4a", true);
        let mut events = Vec::new();

        let summary = merger.merge(&request, &cancelled(), &mut events).unwrap();

        assert_eq!(events, vec![MergeOutcome::Started, MergeOutcome::Completed]);
        assert_eq!(summary.input_count, 2);
        assert_eq!(summary.file_name, "out.m4a");

        let seen = merger.runner.seen.lock().unwrap();
        let (args, script) = &seen[0];
        assert_eq!(&args[..5], &["-f", "concat", "-safe", "0", "-i"]);
        assert_eq!(&args[6..], &["-c", "copy", "/out.m4a"]);
        assert_eq!(script.as_deref(), Some("file '/a.m4a'\nfile '/b.m4a'\n"));

        // Script is gone once the merge returns
        assert!(!Path::new(&args[5]).exists());
    }

    #[test]
    fn test_filter_merge_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());
        let request = MergeRequest::new(["/a.m4a", "/b.m4a", "/c.m4a"], "/out.m4a", false);

        merger.merge(&request, &cancelled(), &mut ()).unwrap();

        let seen = merger.runner.seen.lock().unwrap();
        let (args, script) = &seen[0];
        assert!(script.is_none());
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        assert_eq!(args[6], "-filter_complex");
        assert_eq!(args[7], "[0:0][1:0][2:0]concat=n=3:v=0:a=1[out]");
        assert_eq!(&args[8..], &["-map", "[out]", "/out.m4a"]);
    }

    #[test]
    fn test_failure_then_finish_is_not_completion() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::FailThenFinish), dir.path());
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", false);
        let mut events = Vec::new();

        let err = merger.merge(&request, &cancelled(), &mut events).unwrap_err();

        assert!(matches!(err, MergeError::ExecutionFailure(_)));
        assert_eq!(
            events,
            vec![
                MergeOutcome::Started,
                MergeOutcome::Failed("/a.m4a: No such file or directory".into()),
            ]
        );
    }

    #[test]
    fn test_failure_without_finish() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Fail), dir.path());
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", true);
        let mut events = Vec::new();

        assert!(merger.merge(&request, &cancelled(), &mut events).is_err());
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            MergeOutcome::Failed("Invalid data found when processing input".into())
        );
    }

    #[test]
    fn test_spawn_error_reports_single_failure() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::SpawnError), dir.path());
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", true);
        let mut events = Vec::new();

        assert!(merger.merge(&request, &cancelled(), &mut events).is_err());
        assert_eq!(
            events,
            vec![MergeOutcome::Failed("No such file or directory (os error 2)".into())]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_silent_runner_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Silent), dir.path());
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", true);
        let mut events = Vec::new();

        assert!(merger.merge(&request, &cancelled(), &mut events).is_err());
        assert!(matches!(events.as_slice(), [MergeOutcome::Failed(_)]));
    }

    #[test]
    fn test_invalid_request_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());
        let request = MergeRequest::new(Vec::<String>::new(), "/out.m4a", true);
        let mut events = Vec::new();

        let err = merger.merge(&request, &cancelled(), &mut events).unwrap_err();

        assert!(matches!(err, MergeError::InvalidArgument(_)));
        assert!(matches!(events.as_slice(), [MergeOutcome::Failed(_)]));
        assert_eq!(merger.runner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_output_claim_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());

        let claim = merger.claim_output("/out.m4a").unwrap();
        assert!(matches!(
            merger.claim_output("/out.m4a"),
            Err(MergeError::OutputBusy(_))
        ));
        assert!(merger.claim_output("/other.m4a").is_ok());

        drop(claim);
        assert!(merger.claim_output("/out.m4a").is_ok());
    }

    #[test]
    fn test_output_claim_normalizes_path() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());

        let _claim = merger.claim_output("/x/out.m4a").unwrap();
        assert!(matches!(
            merger.claim_output("/x/./out.m4a"),
            Err(MergeError::OutputBusy(_))
        ));
        assert!(matches!(
            merger.claim_output("/x//out.m4a"),
            Err(MergeError::OutputBusy(_))
        ));
    }

    #[test]
    fn test_busy_output_rejected_while_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let merger = Merger::load(FakeRunner::new(true, Behavior::Succeed), dir.path());
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", true);

        let _claim = merger.claim_output("/out.m4a").unwrap();
        let mut events = Vec::new();
        let err = merger.merge(&request, &cancelled(), &mut events).unwrap_err();

        assert!(matches!(err, MergeError::OutputBusy(_)));
        assert_eq!(merger.runner.calls.load(Ordering::SeqCst), 0);
    }
}
