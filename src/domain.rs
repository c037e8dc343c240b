use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the inputs are joined together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Concat demuxer: stream copy, all inputs must share codec parameters
    #[default]
    ConcatDemuxer,
    /// concat filter: audio-only re-encode, inputs may differ
    FilterGraph,
}

impl MergeStrategy {
    pub fn from_concat_flag(use_concat_demuxer: bool) -> Self {
        if use_concat_demuxer {
            MergeStrategy::ConcatDemuxer
        } else {
            MergeStrategy::FilterGraph
        }
    }

    /// Stream copy only when every input reports the same codec and sample rate
    pub fn for_inputs(infos: &[AudioInfo]) -> Self {
        let first = match infos.first() {
            Some(info) if info.codec.is_some() && info.sample_rate.is_some() => info,
            _ => return MergeStrategy::FilterGraph,
        };

        let uniform = infos
            .iter()
            .all(|info| info.codec == first.codec && info.sample_rate == first.sample_rate);

        MergeStrategy::from_concat_flag(uniform)
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concat" | "demuxer" | "copy" => Ok(MergeStrategy::ConcatDemuxer),
            "filter" | "reencode" | "re-encode" => Ok(MergeStrategy::FilterGraph),
            _ => Err(format!("Unknown strategy: {}. Use 'concat' or 'filter'", s)),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::ConcatDemuxer => write!(f, "concat"),
            MergeStrategy::FilterGraph => write!(f, "filter"),
        }
    }
}

/// A single merge: ordered inputs joined into one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub input_paths: Vec<String>,
    pub output_path: String,
    pub strategy: MergeStrategy,
}

impl MergeRequest {
    pub fn new<I, S>(
        input_paths: I,
        output_path: impl Into<String>,
        use_concat_demuxer: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input_paths: input_paths.into_iter().map(Into::into).collect(),
            output_path: output_path.into(),
            strategy: MergeStrategy::from_concat_flag(use_concat_demuxer),
        }
    }
}

/// Events delivered to a [`crate::merger::MergeListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Started,
    Failed(String),
    Completed,
}

/// Result of a completed merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSummary {
    pub file_name: String,
    pub file_path: String,
    pub strategy: MergeStrategy,
    pub input_count: usize,
    pub output_size: u64,
    pub elapsed_secs: f64,
}

/// Audio information extracted from FFmpeg
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration: Option<String>,
    pub duration_seconds: Option<f64>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
}

/// Everything the front end collected for one run
#[derive(Debug, Clone, Default)]
pub struct MergeConfig {
    pub input_paths: Vec<String>,
    pub output_path: Option<String>,
    /// `None` picks a strategy from the probed inputs
    pub strategy: Option<MergeStrategy>,
    pub script_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<String>,
    pub overwrite: bool,
    pub open: bool,
    pub dry_run: bool,
    pub json: bool,
}
