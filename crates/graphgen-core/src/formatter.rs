use crate::profile::FormatterConfig;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

type Result<T> = std::result::Result<T, FormatError>;

/// External source-code formatter, treated as a black box: raw bytes in
/// on stdin, formatted bytes out on stdout. An empty command is the
/// identity formatter.
#[derive(Clone, Debug, Default)]
pub struct CodeFormatter {
    cmd: Option<(String, Vec<String>)>,
}

impl CodeFormatter {
    pub fn from_config(config: &FormatterConfig) -> Self {
        if config.cmd.is_empty() {
            Self { cmd: None }
        } else {
            Self {
                cmd: Some((config.cmd.clone(), config.args.clone())),
            }
        }
    }

    pub async fn format(&self, input: &[u8]) -> Result<Vec<u8>> {
        let Some((cmd, args)) = &self.cmd else {
            return Ok(input.to_vec());
        };

        let mut child = tokio::process::Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| FormatError::SpawnFailed {
                cmd: cmd.clone(),
                err,
            })?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(FormatError::StdinUnavailable {
                cmd: cmd.clone(),
            });
        };

        // Feed stdin from a separate task while draining stdout, so a
        // formatter that streams its output cannot deadlock us.
        let bytes = input.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&bytes).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| FormatError::WaitFailed {
                cmd: cmd.clone(),
                err,
            })?;

        let write_result = writer.await;

        if !output.status.success() {
            return Err(FormatError::CommandFailed {
                cmd: cmd.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        // A formatter that exits cleanly without draining all of its
        // stdin (broken pipe) still produced usable output.
        if let Ok(Err(err)) = write_result
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(FormatError::StdinWriteFailed {
                cmd: cmd.clone(),
                err,
            });
        }

        Ok(output.stdout)
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to spawn formatter `{cmd}`: {err}")]
    SpawnFailed {
        cmd: String,
        err: std::io::Error,
    },

    #[error("formatter `{cmd}` did not expose a stdin pipe")]
    StdinUnavailable {
        cmd: String,
    },

    #[error("failed to write to formatter `{cmd}` stdin: {err}")]
    StdinWriteFailed {
        cmd: String,
        err: std::io::Error,
    },

    #[error("failed waiting for formatter `{cmd}`: {err}")]
    WaitFailed {
        cmd: String,
        err: std::io::Error,
    },

    #[error("formatter `{cmd}` exited with {status}: {stderr}")]
    CommandFailed {
        cmd: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}
