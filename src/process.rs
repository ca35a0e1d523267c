use crate::error::{Error, Result};
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// A running OS utility whose stdout is consumed line by line.
///
/// The child is killed when this value is dropped.
pub(crate) struct ToolProcess {
    program: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl ToolProcess {
    /// Launches `program`. A missing executable is reported as
    /// [`Error::ToolNotFound`], anything else as [`Error::Launch`].
    pub fn spawn(program: &str, args: &[String]) -> Result<ToolProcess> {
        debug!(program, ?args, "launching");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(program, e))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Launch {
            program: program.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "stdout was not captured"),
        })?;
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });
        Ok(ToolProcess {
            program: program.to_string(),
            child,
            stdout: BufReader::new(stdout),
            stderr,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn stdout(&mut self) -> &mut BufReader<ChildStdout> {
        &mut self.stdout
    }

    /// Waits for the child to exit and returns its status with whatever it
    /// wrote to stderr.
    pub async fn finish(mut self) -> io::Result<(ExitStatus, String)> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Ok((status, stderr))
    }

    /// Kills the child and reaps it.
    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(program = %self.program, error = %e, "kill failed");
        }
    }
}

fn launch_error(program: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::ToolNotFound {
            program: program.to_string(),
        }
    } else {
        Error::Launch {
            program: program.to_string(),
            source: e,
        }
    }
}

/// Reads one line, decoded lossily and stripped of its terminator.
/// Returns `None` at end of stream.
pub(crate) async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
