use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MergeError, Result};

const AUDIO_EXTENSIONS: [&str; 10] = [
    "m4a", "mp3", "aac", "wav", "flac", "ogg", "opus", "wma", "amr", "3gp",
];

/// Check if file looks like an audio file, by extension or by content
pub fn is_audio_file(path: &str) -> bool {
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        if AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return true;
        }
    }

    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return kind.mime_type().starts_with("audio/");
    }

    false
}

/// Format bytes to human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds to human-readable time
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "0s".to_string();
    }

    let total_seconds = seconds.round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Default output: `merged.<ext>` next to the first input
pub fn generate_output_path(first_input: &str) -> String {
    let input_path = Path::new(first_input);

    let extension = input_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("m4a");

    let output_name = format!("merged.{}", extension);

    match input_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(output_name).to_string_lossy().to_string()
        }
        _ => output_name,
    }
}

/// Make a path absolute against the current directory without touching it
pub fn absolute_path(path: &str) -> String {
    let path_obj = Path::new(path);
    if path_obj.is_absolute() {
        return path.to_string();
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path_obj).to_string_lossy().to_string(),
        Err(_) => path.to_string(),
    }
}

/// Where merge scripts go when no directory is configured
pub fn default_script_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "audiomerge")
        .map(|dirs| dirs.cache_dir().join("scripts"))
        .unwrap_or_else(|| std::env::temp_dir().join("audiomerge"))
}

/// Check if file exists
pub fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Lexical normalization: drops `.` segments and repeated separators
pub fn normalize_path(path: &str) -> PathBuf {
    Path::new(path).components().collect()
}

/// True when both strings name the same path once normalized
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b)
}

/// Audio files in `dir_path` plus the output they merge into.
///
/// The output is `output` if given, otherwise the default next to the first
/// file. It is left out of the inputs so a rerun never reads the file it is
/// about to replace.
pub fn directory_merge_plan(
    dir_path: &str,
    output: Option<&str>,
) -> Result<(Vec<String>, String)> {
    let mut files = get_audio_files_in_directory(dir_path)?;

    let output = match (output, files.first()) {
        (Some(output), _) => output.to_string(),
        (None, Some(first)) => generate_output_path(first),
        (None, None) => {
            return Err(MergeError::InvalidArgument(format!(
                "No audio files found in directory: {}",
                dir_path
            )));
        }
    };

    let resolved = absolute_path(&output);
    files.retain(|file| !same_path(&absolute_path(file), &resolved));

    if files.is_empty() {
        return Err(MergeError::InvalidArgument(format!(
            "No audio files found in directory: {}",
            dir_path
        )));
    }

    Ok((files, output))
}

/// Get all audio files from a directory, sorted by path
pub fn get_audio_files_in_directory(dir_path: &str) -> Result<Vec<String>> {
    let path = Path::new(dir_path);

    if !path.exists() {
        return Err(MergeError::InvalidArgument(format!(
            "Directory not found: {}",
            dir_path
        )));
    }

    if !path.is_dir() {
        return Err(MergeError::InvalidArgument(format!(
            "{} is not a directory",
            dir_path
        )));
    }

    let mut audio_files = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();

        if entry_path.is_file() {
            if let Some(path_str) = entry_path.to_str() {
                if is_audio_file(path_str) {
                    audio_files.push(path_str.to_string());
                }
            }
        }
    }

    audio_files.sort();
    Ok(audio_files)
}
