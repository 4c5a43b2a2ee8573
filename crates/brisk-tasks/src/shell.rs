//! Shell command execution

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::TaskError;

/// Run `<program> -c <command>` in `cwd`.
///
/// Each stdout and stderr line is handed to `on_line` as it arrives, with the
/// flag set for stderr. Bytes that are not UTF-8 are replaced, never treated
/// as the end of the stream. A non-zero exit is a [`TaskError::CommandFailed`].
pub async fn run_command<F>(
    program: &str,
    command: &str,
    cwd: &Path,
    mut on_line: F,
) -> Result<(), TaskError>
where
    F: FnMut(&str, bool),
{
    debug!(program, command, cwd = %cwd.display(), "spawning command");

    let mut child = Command::new(program)
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TaskError::CommandSpawn {
            command: command.to_string(),
            message: e.to_string(),
        })?;

    let mut stdout = child.stdout.take().map(BufReader::new);
    let mut stderr = child.stderr.take().map(BufReader::new);
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout, &mut stdout_buf), if stdout.is_some() => match line {
                Some(line) => on_line(&line, false),
                None => stdout = None,
            },
            line = next_line(&mut stderr, &mut stderr_buf), if stderr.is_some() => match line {
                Some(line) => on_line(&line, true),
                None => stderr = None,
            },
        }
    }

    let status = child.wait().await.map_err(|e| TaskError::CommandSpawn {
        command: command.to_string(),
        message: e.to_string(),
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(TaskError::CommandFailed {
            command: command.to_string(),
            code: status.code(),
        })
    }
}

/// Next line of `reader`, `None` at end of stream.
///
/// `buf` must outlive the call: a read interrupted by `select!` leaves its
/// partial bytes there and the next call continues from them.
async fn next_line<R>(reader: &mut Option<BufReader<R>>, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read_until(b'\n', buf).await {
        Ok(0) if buf.is_empty() => None,
        Ok(_) => {
            let line = decode_line(buf);
            buf.clear();
            Some(line)
        }
        Err(e) => {
            debug!(error = %e, "command output stream failed");
            None
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
