use console::Term;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::process::{Command, Stdio};

use crate::error::{MergeError, Result};

/// Whether we can ask the user anything at all
pub fn is_interactive() -> bool {
    Term::stderr().is_term() && Term::stdout().is_term()
}

/// Ask before replacing an existing output file.
///
/// Without a terminal there is nobody to ask, so the answer is no.
pub fn confirm_overwrite(path: &str) -> Result<bool> {
    if !is_interactive() {
        return Ok(false);
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{} already exists. Overwrite?", path))
        .default(false)
        .interact_on(&Term::stderr())
        .map_err(|e| MergeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

fn opener_command(path: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(path);
        command
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", path]);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(path);
        command
    }
}

/// Hand the merged file to the platform's default audio player
pub fn open_in_player(path: &str) -> Result<()> {
    let status = opener_command(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;

    if !status.success() {
        tracing::warn!(path, %status, "opener exited unsuccessfully");
    }
    Ok(())
}
