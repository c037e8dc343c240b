mod cli;
mod command;
mod domain;
mod error;
mod ffmpeg;
mod fs;
mod interactive;
mod merger;
mod output;
mod progress;
mod telemetry;

use clap::Parser;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cli::Cli;
use domain::{AudioInfo, MergeConfig, MergeRequest, MergeStrategy};
use error::{MergeError, Result};
use ffmpeg::FFmpeg;
use merger::{MergeListener, Merger};
use output::*;

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = match get_input_files(&cli) {
        Ok((files, output)) => {
            let mut config = cli.to_config(files);
            config.output_path = output;
            config
        }
        Err(e) => {
            report_error(&e, cli.json);
            std::process::exit(1);
        }
    };

    // Ctrl+C stops FFmpeg instead of killing us mid-merge
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        cancelled_clone.store(true, Ordering::Relaxed);
    }) {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }

    let json = config.json;
    match run(config, &cancelled) {
        Ok(()) => {}
        Err(MergeError::Cancelled) => {
            if json {
                report_error(&MergeError::Cancelled, json);
            } else {
                print_cancelled();
            }
            std::process::exit(130);
        }
        Err(e) => {
            report_error(&e, json);
            std::process::exit(1);
        }
    }
}

fn report_error(error: &MergeError, json: bool) {
    if json {
        print_error_json(error);
    } else {
        print_error_with_hint(error);
    }
}

/// Inputs from the command line, or every audio file in `--dir` except the
/// output. Returns the output too once `--dir` has fixed it.
fn get_input_files(cli: &Cli) -> Result<(Vec<String>, Option<String>)> {
    match &cli.dir {
        Some(dir) => {
            let (files, output) = fs::directory_merge_plan(dir, cli.output.as_deref())?;
            Ok((files, Some(output)))
        }
        None => Ok((cli.input.clone(), cli.output.clone())),
    }
}

/// Build the one merger this process uses.
///
/// A missing FFmpeg is not an error here: the merger is created unsupported
/// and reports that when asked to merge.
fn load_merger(config: &MergeConfig) -> Merger<FFmpeg> {
    let script_dir = config
        .script_dir
        .as_ref()
        .map(|dir| std::path::PathBuf::from(fs::absolute_path(&dir.to_string_lossy())))
        .unwrap_or_else(fs::default_script_dir);

    match &config.ffmpeg_path {
        Some(path) => Merger::load(FFmpeg::with_path(path.clone()), script_dir),
        None => match FFmpeg::new() {
            Ok(ffmpeg) => Merger::load(ffmpeg, script_dir),
            Err(e) => {
                tracing::warn!(error = %e, "FFmpeg binary unavailable");
                Merger::new(FFmpeg::with_path("ffmpeg"), false, script_dir)
            }
        },
    }
}

fn probe_inputs(merger: &Merger<FFmpeg>, inputs: &[String]) -> Vec<AudioInfo> {
    if !merger.is_supported() {
        return Vec::new();
    }

    inputs
        .iter()
        .map(|input| {
            merger.runner().get_audio_info(input).unwrap_or_else(|e| {
                tracing::debug!(input = %input, error = %e, "could not probe input");
                AudioInfo::default()
            })
        })
        .collect()
}

fn run(config: MergeConfig, cancelled: &AtomicBool) -> Result<()> {
    if !config.json {
        print_header();
    }

    let first_input = config
        .input_paths
        .first()
        .ok_or_else(|| MergeError::InvalidArgument("No input files specified".to_string()))?;

    let output_path = fs::absolute_path(
        &config
            .output_path
            .clone()
            .unwrap_or_else(|| fs::generate_output_path(first_input)),
    );
    let inputs: Vec<String> = config.input_paths.iter().map(|p| fs::absolute_path(p)).collect();

    if !config.json {
        for input in inputs.iter().filter(|p| !fs::is_audio_file(p)) {
            print_warning(&format!("{} does not look like an audio file", input));
        }
    }

    let merger = load_merger(&config);
    let infos = probe_inputs(&merger, &inputs);

    let strategy = match config.strategy {
        Some(strategy) => {
            let probed = infos.iter().all(|info| info.codec.is_some());
            if strategy == MergeStrategy::ConcatDemuxer
                && probed
                && MergeStrategy::for_inputs(&infos) == MergeStrategy::FilterGraph
                && !config.json
            {
                print_warning(
                    "Inputs differ in codec or sample rate. Try --strategy filter if concat fails.",
                );
            }
            strategy
        }
        None => MergeStrategy::for_inputs(&infos),
    };

    let request = MergeRequest::new(
        inputs,
        output_path,
        strategy == MergeStrategy::ConcatDemuxer,
    );
    // Checked before the overwrite prompt
    command::validate_request(&request)?;

    if config.dry_run {
        let script_path = merger.script_dir().join("merge-<id>.txt");
        let args = command::command_args(&request, &script_path);
        if config.json {
            print_command_json(merger.runner().path(), &args);
        } else {
            print_plan(&request.input_paths, &infos, &request.output_path, strategy);
            print_command(merger.runner().path(), &args);
        }
        return Ok(());
    }

    if fs::file_exists(&request.output_path) && !config.overwrite {
        let confirmed = !config.json && interactive::confirm_overwrite(&request.output_path)?;
        if !confirmed {
            return Err(MergeError::OutputExists(request.output_path.clone()));
        }
    }

    // Only known when every input reported a duration
    let total_duration: Option<f64> = if infos.is_empty() {
        None
    } else {
        infos.iter().map(|info| info.duration_seconds).sum()
    };

    let mut listener: Box<dyn MergeListener> = if config.json {
        Box::new(())
    } else {
        print_plan(&request.input_paths, &infos, &request.output_path, strategy);
        Box::new(BarListener::new(create_progress_bar(total_duration), total_duration))
    };

    let summary = merger.merge(&request, cancelled, listener.as_mut())?;

    if config.json {
        print_result_json(&summary);
    } else {
        print_result(&summary);
    }

    if config.open {
        if !config.json {
            print_info(&format!("Opening {}", summary.file_path));
        }
        interactive::open_in_player(&summary.file_path)?;
    }

    Ok(())
}
