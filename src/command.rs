use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::{MergeRequest, MergeStrategy};
use crate::error::{MergeError, Result};
use crate::fs::same_path;

/// Concat-demuxer script listing the inputs, removed from disk on drop
#[derive(Debug)]
pub struct MergeScript {
    path: PathBuf,
}

impl MergeScript {
    /// Write a fresh script under `dir`, one `file '<path>'` line per input.
    ///
    /// Every call gets its own file name so concurrent merges never share a
    /// script. The writer is flushed and closed before this returns.
    pub fn write(dir: &Path, input_paths: &[String]) -> Result<Self> {
        fs::create_dir_all(dir).map_err(MergeError::ScriptWrite)?;

        let path = dir.join(format!("merge-{}.txt", nanoid::nanoid!(10)));
        let file = File::create(&path).map_err(MergeError::ScriptWrite)?;

        // Own the path from here on so a failed write still cleans up
        let script = Self { path };

        let mut writer = BufWriter::new(file);
        writer
            .write_all(Self::render(input_paths).as_bytes())
            .and_then(|_| writer.flush())
            .map_err(MergeError::ScriptWrite)?;

        tracing::debug!(
            path = %script.path.display(),
            inputs = input_paths.len(),
            "wrote merge script"
        );
        Ok(script)
    }

    /// Script body for the given inputs.
    ///
    /// A `'` inside a path is written as `'\''`, which the concat demuxer
    /// reads back as a literal quote.
    pub fn render(input_paths: &[String]) -> String {
        input_paths
            .iter()
            .map(|path| format!("file '{}'\n", path.replace('\'', r"'\''")))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MergeScript {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed merge script"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not remove merge script"
                )
            }
        }
    }
}

/// Arguments ready for dispatch, plus the script they reference (if any)
#[derive(Debug)]
pub struct PreparedCommand {
    pub args: Vec<String>,
    script: Option<MergeScript>,
}

impl PreparedCommand {
    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(MergeScript::path)
    }
}

/// Reject requests that can never produce a command
pub fn validate_request(request: &MergeRequest) -> Result<()> {
    if request.input_paths.is_empty() {
        return Err(MergeError::InvalidArgument(
            "Input audio files are not valid".to_string(),
        ));
    }

    if request.output_path.trim().is_empty() {
        return Err(MergeError::InvalidArgument(
            "Output path must not be empty".to_string(),
        ));
    }

    if let Some(input) = request
        .input_paths
        .iter()
        .find(|input| same_path(input, &request.output_path))
    {
        return Err(MergeError::InvalidArgument(format!(
            "Output {} is also an input",
            input
        )));
    }

    Ok(())
}

/// `[0:0][1:0]...[N-1:0]concat=n=N:v=0:a=1[out]`
pub fn filter_graph(input_count: usize) -> String {
    let mut graph: String = (0..input_count).map(|i| format!("[{}:0]", i)).collect();
    graph.push_str(&format!("concat=n={}:v=0:a=1[out]", input_count));
    graph
}

/// Token list for a request without touching the filesystem.
///
/// `script_path` is only read for the concat-demuxer strategy.
pub fn command_args(request: &MergeRequest, script_path: &Path) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    match request.strategy {
        MergeStrategy::ConcatDemuxer => {
            args.extend([
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                script_path.to_string_lossy().to_string(),
                "-c".to_string(),
                "copy".to_string(),
            ]);
        }
        MergeStrategy::FilterGraph => {
            for input in &request.input_paths {
                args.extend(["-i".to_string(), input.clone()]);
            }
            args.extend([
                "-filter_complex".to_string(),
                filter_graph(request.input_paths.len()),
                "-map".to_string(),
                "[out]".to_string(),
            ]);
        }
    }

    args.push(request.output_path.clone());
    args
}

/// Validate the request, clear any existing output and build its command.
///
/// An existing file at the output path is deleted unconditionally. For the
/// concat-demuxer strategy the merge script is written under `script_dir`.
pub fn build_merge_command(request: &MergeRequest, script_dir: &Path) -> Result<PreparedCommand> {
    validate_request(request)?;

    let output = Path::new(&request.output_path);
    if output.is_file() {
        tracing::info!(path = %output.display(), "deleting existing output");
        fs::remove_file(output)?;
    }

    let script = match request.strategy {
        MergeStrategy::ConcatDemuxer => Some(MergeScript::write(script_dir, &request.input_paths)?),
        MergeStrategy::FilterGraph => None,
    };

    let args = command_args(
        request,
        script.as_ref().map(MergeScript::path).unwrap_or_else(|| Path::new("")),
    );

    Ok(PreparedCommand { args, script })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
    }

    #[test]
    fn test_concat_demuxer_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let request = MergeRequest::new(["/a.m4a", "/b.m4a"], "/out.m4a", true);

        let prepared = build_merge_command(&request, dir.path()).unwrap();
        let script = prepared.script_path().unwrap();
        let script_path = script.to_string_lossy().to_string();

        assert_eq!(
            prepared.args,
            vec![
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                script_path.as_str(),
                "-c",
                "copy",
                "/out.m4a"
            ]
        );
        assert_eq!(
            fs::read_to_string(script).unwrap(),
            "file '/a.m4a'\nfile '/b.m4a'\n"
        );
    }

    #[test]
    fn test_filter_graph_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let request = MergeRequest::new(["/a.m4a", "/b.m4a", "/c.m4a"], "/out.m4a", false);

        let prepared = build_merge_command(&request, dir.path()).unwrap();

        assert!(prepared.script_path().is_none());
        assert_eq!(
            prepared.args,
            vec![
                "-i",
                "/a.m4a",
                "-i",
                "/b.m4a",
                "-i",
                "/c.m4a",
                "-filter_complex",
                "[0:0][1:0][2:0]concat=n=3:v=0:a=1[out]",
                "-map",
                "[out]",
                "/out.m4a",
            ]
        );
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_filter_graph_single_input() {
        assert_eq!(filter_graph(1), "[0:0]concat=n=1:v=0:a=1[out]");
    }

    #[test]
    fn test_paths_with_spaces_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let request = MergeRequest::new(
            ["/music/side a.m4a", "/music/side b.m4a"],
            "/music/full album.m4a",
            false,
        );

        let prepared = build_merge_command(&request, dir.path()).unwrap();

        assert_eq!(prepared.args[1], "/music/side a.m4a");
        assert_eq!(prepared.args[3], "/music/side b.m4a");
        assert_eq!(prepared.args.last().unwrap(), "/music/full album.m4a");
        assert_eq!(prepared.args.len(), 9);
    }

    #[test]
    fn test_empty_inputs_rejected_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");
        fs::write(&output, b"keep me").unwrap();
        let script_dir = dir.path().join("scripts");

        let request = MergeRequest::new(Vec::<String>::new(), output.to_string_lossy(), true);
        let err = build_merge_command(&request, &script_dir).unwrap_err();

        assert!(matches!(err, MergeError::InvalidArgument(_)));
        assert!(output.exists());
        assert!(!script_dir.exists());
    }

    #[test]
    fn test_empty_output_rejected() {
        let request = MergeRequest::new(["/a.m4a"], "  ", true);
        assert!(matches!(
            validate_request(&request),
            Err(MergeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_output_among_inputs_rejected_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.m4a");
        fs::write(&source, b"recording").unwrap();
        let script_dir = dir.path().join("scripts");

        let aliased = dir.path().join(".").join("a.m4a");
        let request = MergeRequest::new(
            [source.to_string_lossy(), "/b.m4a".into()],
            aliased.to_string_lossy(),
            true,
        );
        let err = build_merge_command(&request, &script_dir).unwrap_err();

        assert!(matches!(err, MergeError::InvalidArgument(_)));
        assert_eq!(fs::read(&source).unwrap(), b"recording");
        assert!(!script_dir.exists());
    }

    #[test]
    fn test_single_quotes_escaped_in_script() {
        let inputs = vec!["/music/Don't Stop.m4a".to_string(), "/music/b.m4a".to_string()];
        assert_eq!(
            MergeScript::render(&inputs),
            "file '/music/Don'\\''t Stop.m4a'\nfile '/music/b.m4a'\n"
        );
    }

    #[test]
    fn test_existing_output_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");
        fs::write(&output, b"old merge").unwrap();

        let request = MergeRequest::new(["/a.m4a"], output.to_string_lossy(), false);
        build_merge_command(&request, dir.path()).unwrap();

        assert!(!output.exists());
    }

    #[test]
    fn test_script_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let request = MergeRequest::new(["/a.m4a"], "/out.m4a", true);

        let prepared = build_merge_command(&request, dir.path()).unwrap();
        let path = prepared.script_path().unwrap().to_path_buf();
        assert!(path.exists());

        drop(prepared);
        assert!(!path.exists());
    }

    #[test]
    fn test_each_request_gets_its_own_script() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec!["/a.m4a".to_string()];

        let first = MergeScript::write(dir.path(), &inputs).unwrap();
        let second = MergeScript::write(dir.path(), &inputs).unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(entries(dir.path()), 2);
    }

    #[test]
    fn test_script_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cache").join("scripts");

        let script = MergeScript::write(&nested, &["/a.m4a".to_string()]).unwrap();
        assert!(script.path().starts_with(&nested));
    }
}
