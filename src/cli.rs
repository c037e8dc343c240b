use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::domain::{MergeConfig, MergeStrategy};

#[derive(Parser, Debug)]
#[command(
    name = "audiomerge",
    version,
    about = "Merge multiple audio files into one, powered by FFmpeg",
    long_about = "audiomerge - join audio files end to end.\n\n\
                  Examples:\n  \
                  audiomerge intro.m4a part1.m4a part2.m4a -o episode.m4a\n  \
                  audiomerge a.mp3 b.wav -o mix.m4a --strategy filter\n  \
                  audiomerge --dir recordings/ -o all.m4a --strategy auto\n  \
                  audiomerge a.m4a b.m4a -o out.m4a --dry-run"
)]
pub struct Cli {
    /// Input audio files, merged in the order given
    #[arg(required_unless_present = "dir")]
    pub input: Vec<String>,

    /// Merge every audio file in a directory, in name order
    #[arg(long, conflicts_with = "input")]
    pub dir: Option<String>,

    /// Output file path (default: merged.<ext> next to the first input)
    #[arg(short, long)]
    pub output: Option<String>,

    /// How inputs are joined
    #[arg(short, long, value_enum, default_value = "concat")]
    pub strategy: StrategyArg,

    /// Shortcut for --strategy filter
    #[arg(long)]
    pub reencode: bool,

    /// Overwrite output file without asking
    #[arg(short = 'y', long)]
    pub overwrite: bool,

    /// Directory for temporary concat scripts
    #[arg(long)]
    pub script_dir: Option<PathBuf>,

    /// FFmpeg binary to use instead of searching for one
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Open the merged file with the default player when done
    #[arg(long)]
    pub open: bool,

    /// Print the FFmpeg command without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Concat demuxer, stream copy (inputs share codec and sample rate)
    Concat,
    /// concat filter, audio re-encode (inputs may differ)
    Filter,
    /// Probe the inputs and pick concat when they match
    Auto,
}

impl StrategyArg {
    pub fn resolve(self) -> Option<MergeStrategy> {
        match self {
            StrategyArg::Concat => Some(MergeStrategy::ConcatDemuxer),
            StrategyArg::Filter => Some(MergeStrategy::FilterGraph),
            StrategyArg::Auto => None,
        }
    }
}

impl Cli {
    pub fn to_config(&self, input_paths: Vec<String>) -> MergeConfig {
        let strategy = if self.reencode {
            Some(MergeStrategy::FilterGraph)
        } else {
            self.strategy.resolve()
        };

        MergeConfig {
            input_paths,
            output_path: self.output.clone(),
            strategy,
            script_dir: self.script_dir.clone(),
            ffmpeg_path: self.ffmpeg.clone(),
            overwrite: self.overwrite,
            open: self.open,
            dry_run: self.dry_run,
            json: self.json,
        }
    }
}
