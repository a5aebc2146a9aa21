//! External compression tool invocation.

use crate::error::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

// Keep tool error output short in logs
const STDERR_LIMIT: usize = 512;

/// One candidate command, e.g. `gs` or `sh ./wrap.sh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub leading_args: Vec<String>,
}

impl ToolCommand {
    /// Split a configured entry: first word is the program, the rest are
    /// prepended to every invocation.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut words = entry.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            leading_args: words.collect(),
        })
    }

    async fn run(&self, args: &[String], limit: Duration) -> Result<(), ToolError> {
        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // dropping the future on timeout kills the child
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: self.program.clone(),
                    timeout: limit,
                });
            }
        };

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if stderr.len() > STDERR_LIMIT {
                let mut cut = STDERR_LIMIT;
                while !stderr.is_char_boundary(cut) {
                    cut -= 1;
                }
                stderr.truncate(cut);
            }
            return Err(ToolError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr,
            });
        }
        Ok(())
    }
}

/// Ordered candidates; the first one that runs successfully wins.
#[derive(Debug, Clone)]
pub struct ToolChain {
    candidates: Vec<ToolCommand>,
    timeout: Duration,
}

impl ToolChain {
    pub fn new(entries: &[String], timeout: Duration) -> Self {
        Self {
            candidates: entries.iter().filter_map(|e| ToolCommand::parse(e)).collect(),
            timeout,
        }
    }

    pub fn candidates(&self) -> &[ToolCommand] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Run `args` through each candidate in turn. Returns the program that
    /// succeeded, or the last failure.
    pub async fn run_first(&self, args: &[String]) -> Result<&str, ToolError> {
        let mut last_error = ToolError::NoCandidates;

        for candidate in &self.candidates {
            match candidate.run(args, self.timeout).await {
                Ok(()) => {
                    debug!(program = %candidate.program, "compression tool succeeded");
                    return Ok(candidate.program.as_str());
                }
                Err(e) => {
                    warn!(program = %candidate.program, error = %e, "compression tool failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
