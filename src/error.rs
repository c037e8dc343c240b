use thiserror::Error;

/// Reason reported to listeners when FFmpeg could not be loaded on this host.
pub const NOT_SUPPORTED_REASON: &str = "Not supported on this device.";

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("{}", NOT_SUPPORTED_REASON)]
    CapabilityUnsupported,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to write merge script: {0}")]
    ScriptWrite(std::io::Error),

    #[error("{0}")]
    ExecutionFailure(String),

    #[error("Another merge is already writing to {0}")]
    OutputBusy(String),

    #[error("Output file already exists: {0}")]
    OutputExists(String),

    #[error("FFmpeg not found. Please install FFmpeg or set AUDIOMERGE_FFMPEG_PATH.")]
    FfmpegNotFound,

    #[error("Merge cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
