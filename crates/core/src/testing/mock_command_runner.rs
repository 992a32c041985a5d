//! Mock command runner for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::command::{CommandError, CommandOutput, CommandRunner};

/// A command invocation recorded by [`MockCommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug)]
struct Scripted {
    output: Result<CommandOutput, ()>,
    writes: Option<Vec<u8>>,
}

/// Mock implementation of [`CommandRunner`].
///
/// Replies are consumed in FIFO order. Once the script runs out, every call
/// fails with [`CommandError::NotFound`], which is how a missing tool looks.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockCommandRunner::new();
/// runner.push_output(CommandOutput { exit_code: Some(0), ..Default::default() });
/// runner.push_writing_output(CommandOutput { exit_code: Some(0), ..Default::default() }, b"data".to_vec());
/// ```
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCommand>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn push_output(&self, output: CommandOutput) {
        self.push(Scripted {
            output: Ok(output),
            writes: None,
        });
    }

    /// Queue a reply that also writes `contents` to the last argument,
    /// the way an encoder writes its output file.
    pub fn push_writing_output(&self, output: CommandOutput, contents: Vec<u8>) {
        self.push(Scripted {
            output: Ok(output),
            writes: Some(contents),
        });
    }

    /// Queue a timeout.
    pub fn push_timeout(&self) {
        self.push(Scripted {
            output: Err(()),
            writes: None,
        });
    }

    /// Queue a timeout after writing `contents` to the last argument, the
    /// way a killed encoder leaves a partial output.
    pub fn push_partial_timeout(&self, contents: Vec<u8>) {
        self.push(Scripted {
            output: Err(()),
            writes: Some(contents),
        });
    }

    /// All invocations so far.
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }

    /// Strips an ImageMagick style `WEBP:` prefix from an output argument.
    fn output_path(arg: &str) -> PathBuf {
        match arg.split_once(':') {
            Some((prefix, rest))
                if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_uppercase()) =>
            {
                PathBuf::from(rest)
            }
            _ => PathBuf::from(arg),
        }
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        limit: Duration,
    ) -> Result<CommandOutput, CommandError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCommand {
                program: program.to_path_buf(),
                args: args.to_vec(),
            });
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let Some(next) = next else {
            return Err(CommandError::NotFound {
                program: program.to_path_buf(),
            });
        };

        if let (Some(contents), Some(last)) = (next.writes, args.last()) {
            tokio::fs::write(Self::output_path(last), contents).await?;
        }

        next.output.map_err(|_| CommandError::Timeout {
            timeout_secs: limit.as_secs(),
        })
    }
}
