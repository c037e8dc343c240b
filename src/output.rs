use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::domain::{AudioInfo, MergeStrategy, MergeSummary};
use crate::error::MergeError;
use crate::fs::{format_duration, format_size};
use crate::merger::MergeListener;
use crate::progress::ProgressMetrics;

/// Print application header
pub fn print_header() {
    println!();
    println!(
        "{}",
        format!("  audiomerge v{}", env!("CARGO_PKG_VERSION")).bright_cyan().bold()
    );
    println!("{}", "━".repeat(50).dimmed());
    println!();
}

/// Print what is about to be merged
pub fn print_plan(
    inputs: &[String],
    infos: &[AudioInfo],
    output_path: &str,
    strategy: MergeStrategy,
) {
    println!("{}", "Merge Plan".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());

    for (i, input) in inputs.iter().enumerate() {
        let detail = infos
            .get(i)
            .map(|info| {
                let mut parts = Vec::new();
                if let Some(codec) = &info.codec {
                    parts.push(codec.clone());
                }
                if let Some(rate) = info.sample_rate {
                    parts.push(format!("{} Hz", rate));
                }
                if let Some(secs) = info.duration_seconds {
                    parts.push(format_duration(secs));
                }
                parts.join(", ")
            })
            .unwrap_or_default();

        println!(
            "  {} {} {}",
            format!("[{}]", i + 1).dimmed(),
            input.bright_white(),
            detail.dimmed()
        );
    }

    println!();
    println!(
        "  {} {}",
        "Strategy:".dimmed(),
        match strategy {
            MergeStrategy::ConcatDemuxer => "concat (stream copy)".bright_green(),
            MergeStrategy::FilterGraph => "filter (re-encode)".bright_blue(),
        }
    );
    println!("  {} {}", "Output:".dimmed(), output_path.bright_white());
    println!();
}

/// Print a dry-run command
pub fn print_command(program: &str, args: &[String]) {
    println!("{}", "FFmpeg Command".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());
    println!("  {}", program.bright_cyan());
    for arg in args {
        println!("    {}", arg);
    }
    println!();
}

#[derive(Serialize)]
struct CommandJson<'a> {
    program: &'a str,
    args: &'a [String],
}

pub fn print_command_json(program: &str, args: &[String]) {
    let json = CommandJson { program, args };
    match serde_json::to_string_pretty(&json) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{{\"error\": \"{}\"}}", e),
    }
}

/// Progress bar when the total duration is known, spinner otherwise
pub fn create_progress_bar(total_duration: Option<f64>) -> ProgressBar {
    let pb = match total_duration {
        Some(_) => {
            let pb = ProgressBar::new(10000);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    };
    pb.set_message("Starting FFmpeg...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Update progress bar from the latest metrics
pub fn update_progress(pb: &ProgressBar, metrics: &ProgressMetrics) {
    let written = format_size(metrics.output_size);
    let processed = format_duration(metrics.processed_seconds);
    let speed = metrics
        .reported_speed
        .map(|speed| format!(" | {:.1}x", speed))
        .unwrap_or_default();

    match metrics.percent() {
        Some(percent) => {
            // 0-100 mapped onto 0-10000 for precision
            pb.set_position((percent * 100.0) as u64);

            let eta_msg = match metrics.calculate_eta() {
                Some(eta_secs) => {
                    let eta_mins = (eta_secs / 60.0) as u64;
                    let eta_secs_rem = (eta_secs % 60.0) as u64;
                    format!("{:02}:{:02}", eta_mins, eta_secs_rem)
                }
                None => "--:--".to_string(),
            };

            pb.set_message(format!(
                "{:.2}% | ETA: {} | {} written{}",
                percent, eta_msg, written, speed
            ));
        }
        None => {
            pb.set_message(format!("{} merged | {} written{}", processed, written, speed));
        }
    }
}

/// Drives the progress bar from merge events
pub struct BarListener {
    pb: ProgressBar,
    metrics: ProgressMetrics,
}

impl BarListener {
    pub fn new(pb: ProgressBar, total_duration: Option<f64>) -> Self {
        Self {
            pb,
            metrics: ProgressMetrics::new(total_duration),
        }
    }
}

impl MergeListener for BarListener {
    fn on_started(&mut self) {
        self.pb.set_message("Merging...");
    }

    fn on_progress(&mut self, line: &str) {
        if self.metrics.update_from_line(line) {
            update_progress(&self.pb, &self.metrics);
        }
    }

    fn on_failure(&mut self, _reason: &str) {
        self.pb.abandon_with_message("Failed");
    }

    fn on_complete(&mut self) {
        if self.metrics.total_duration.is_some() {
            self.pb.set_position(10000);
        }
        self.pb.finish_with_message("Done!");
    }
}

/// Print merge result
pub fn print_result(result: &MergeSummary) {
    println!();
    println!("{}", "━".repeat(50).dimmed());
    println!(
        "{} {}",
        "✓".bright_green().bold(),
        "Merge complete!".bright_green().bold()
    );
    println!();
    println!(
        "  {} {} files ({})",
        "Inputs:".dimmed(),
        result.input_count.to_string().bright_white(),
        result.strategy
    );
    println!(
        "  {} {}",
        "Size:".dimmed(),
        format_size(result.output_size).bright_yellow()
    );
    println!("  {} {:.2}s", "Time:".dimmed(), result.elapsed_secs);
    println!();
    println!("  {} {}", "Output:".dimmed(), result.file_path.bright_cyan());
    println!();
}

pub fn print_result_json(result: &MergeSummary) {
    match serde_json::to_string_pretty(result) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{{\"error\": \"{}\"}}", e),
    }
}

#[derive(Serialize)]
struct ErrorJson {
    error: String,
}

pub fn print_error_json(error: &MergeError) {
    let json = ErrorJson {
        error: error.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&json) {
        println!("{}", text);
    }
}

/// Print error message with actionable hints based on error type
pub fn print_error_with_hint(error: &MergeError) {
    eprintln!();
    eprintln!(
        "{} {}",
        "✗".bright_red().bold(),
        error.to_string().bright_red()
    );
    eprintln!();

    let hint = match error {
        MergeError::CapabilityUnsupported | MergeError::FfmpegNotFound => {
            "💡 How to install FFmpeg:\n\
             \n\
             Windows:\n\
               • winget install Gyan.FFmpeg\n\
             \n\
             macOS:\n\
               • brew install ffmpeg\n\
             \n\
             Linux:\n\
               • sudo apt install ffmpeg  (Debian/Ubuntu)\n\
               • sudo dnf install ffmpeg  (Fedora)\n\
             \n\
             Or point AUDIOMERGE_FFMPEG_PATH / --ffmpeg at a working binary."
                .to_string()
        }
        MergeError::InvalidArgument(_) => {
            "💡 Pass at least one input file and an output path that is not one of the inputs."
                .to_string()
        }
        MergeError::ScriptWrite(_) => {
            "💡 The concat script could not be written:\n\
             \n\
               • Check that --script-dir exists or can be created\n\
               • Make sure you have write permission there\n\
               • Or use --strategy filter, which needs no script"
                .to_string()
        }
        MergeError::ExecutionFailure(_) => {
            "💡 FFmpeg could not merge the inputs:\n\
             \n\
               • Check that every input path exists\n\
               • With --strategy concat all inputs must share codec and sample rate;\n\
                 try --strategy filter (or --strategy auto) for mixed inputs\n\
               • The output extension decides the container; make sure it fits the codec"
                .to_string()
        }
        MergeError::OutputBusy(path) => format!(
            "💡 Another merge is writing to {}. Wait for it or choose a different output.",
            path
        ),
        MergeError::OutputExists(path) => format!(
            "💡 {} already exists. Use -y to overwrite it or pick another --output.",
            path
        ),
        MergeError::Io(io_error) => format!(
            "💡 File system error:\n\
             \n\
               {}\n\
             \n\
               • Check available disk space\n\
               • Verify you have read/write permissions",
            io_error
        ),
        MergeError::Cancelled => {
            "💡 Merge was cancelled. Any partial output was left as is.".to_string()
        }
    };

    eprintln!("{}", hint.bright_blue());
    eprintln!();
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        "⚠".bright_yellow().bold(),
        message.bright_yellow()
    );
}

/// Print info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".bright_blue().bold(), message);
}

/// Print cancelled message
pub fn print_cancelled() {
    eprintln!();
    eprintln!(
        "{} {}",
        "⚠".bright_yellow().bold(),
        "Merge cancelled by user.".bright_yellow()
    );
    eprintln!();
}
