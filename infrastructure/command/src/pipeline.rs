use std::fmt;
use std::io;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use rustix::fs::OFlags;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{CommandException, CommandResult};

/// One process of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where the first process of a pipeline reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StageInput {
    #[default]
    Null,
    File(PathBuf),
    /// Written to stdin while the pipeline runs.
    Bytes(Vec<u8>),
}

impl StageInput {
    fn stdio(&self) -> io::Result<Stdio> {
        Ok(match self {
            StageInput::Null => Stdio::null(),
            StageInput::File(path) => Stdio::from(std::fs::File::open(path)?),
            StageInput::Bytes(_) => Stdio::piped(),
        })
    }
}

/// Where the last process of a pipeline writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StageOutput {
    /// Collected into [`PipelineOutput::stdout`].
    #[default]
    Capture,
    File(PathBuf),
}

impl StageOutput {
    fn stdio(&self) -> io::Result<Stdio> {
        Ok(match self {
            StageOutput::Capture => Stdio::piped(),
            StageOutput::File(path) => Stdio::from(std::fs::File::create(path)?),
        })
    }
}

#[derive(Debug, Clone)]
enum Stages {
    Single(Stage),
    Piped { export: Stage, import: Stage },
}

/// Output of a successful pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Stdout of the last process, empty when it went to a file.
    pub stdout: Vec<u8>,
    /// Stderr of every process, in pipeline order.
    pub stderr: Vec<u8>,
}

/// One process, or an exporting process whose stdout is the stdin of an
/// importing process.
///
/// Stderr of every process is always collected, and all collecting happens
/// concurrently, so neither end can stall on a full pipe.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Stages,
    input: StageInput,
    output: StageOutput,
}

impl Pipeline {
    pub fn single(stage: Stage) -> Self {
        Self {
            stages: Stages::Single(stage),
            input: StageInput::default(),
            output: StageOutput::default(),
        }
    }

    pub fn piped(export: Stage, import: Stage) -> Self {
        Self {
            stages: Stages::Piped { export, import },
            input: StageInput::default(),
            output: StageOutput::default(),
        }
    }

    pub fn stdin(mut self, input: StageInput) -> Self {
        self.input = input;
        self
    }

    pub fn stdout(mut self, output: StageOutput) -> Self {
        self.output = output;
        self
    }

    pub async fn run(self) -> CommandResult<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let Pipeline {
            stages,
            input,
            output,
        } = self;
        match stages {
            Stages::Single(stage) => {
                tracing::debug!(%run_id, "Running `{stage}`");
                let mut child = spawn(&stage, input.stdio()?, output.stdio()?)?;
                let feeder = feed(&mut child, input);
                let out = child.wait_with_output().await?;
                let out = check(&stage, out)?;
                join_feeder(feeder).await?;
                Ok(out)
            }
            Stages::Piped { export, import } => {
                tracing::debug!(%run_id, "Piping `{export}` into `{import}`");
                let mut export_child = spawn(&export, input.stdio()?, Stdio::piped())?;
                let feeder = feed(&mut export_child, input);
                let pipe = export_child.stdout.take().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Other, "export stdout was not captured")
                })?;
                // `spawn` drops the parent's copy of the pipe, from then on
                // only the two children hold it.
                let import_child = spawn(&import, Stdio::from(blocking_fd(pipe)?), output.stdio()?)?;
                let (import_out, export_out) = tokio::join!(
                    import_child.wait_with_output(),
                    export_child.wait_with_output()
                );
                let export_out = check(&export, export_out?)?;
                let import_out = check(&import, import_out?)?;
                join_feeder(feeder).await?;
                let mut stderr = export_out.stderr;
                stderr.extend(import_out.stderr);
                Ok(PipelineOutput {
                    stdout: import_out.stdout,
                    stderr,
                })
            }
        }
    }
}

fn spawn(stage: &Stage, stdin: Stdio, stdout: Stdio) -> CommandResult<Child> {
    let mut command = Command::new(&stage.program);
    command
        .args(&stage.args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command.spawn().map_err(|source| CommandException::Spawn {
        command: stage.to_string(),
        source,
    })
}

/// Hand the export stdout over as a plain blocking descriptor for the importing child.
fn blocking_fd(pipe: ChildStdout) -> CommandResult<OwnedFd> {
    let fd = pipe.into_owned_fd()?;
    let flags = rustix::fs::fcntl_getfl(&fd).map_err(io::Error::from)?;
    if flags.contains(OFlags::NONBLOCK) {
        rustix::fs::fcntl_setfl(&fd, flags.difference(OFlags::NONBLOCK))
            .map_err(io::Error::from)?;
    }
    Ok(fd)
}

fn feed(child: &mut Child, input: StageInput) -> Option<JoinHandle<io::Result<()>>> {
    let StageInput::Bytes(data) = input else {
        return None;
    };
    let mut stdin = child.stdin.take()?;
    Some(tokio::spawn(async move {
        stdin.write_all(&data).await?;
        stdin.shutdown().await
    }))
}

async fn join_feeder(feeder: Option<JoinHandle<io::Result<()>>>) -> CommandResult<()> {
    let Some(feeder) = feeder else {
        return Ok(());
    };
    match feeder.await.map_err(|e| io::Error::new(io::ErrorKind::Other, e))? {
        // The process quit reading but exited fine.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}

fn check(stage: &Stage, output: Output) -> CommandResult<PipelineOutput> {
    if output.status.success() {
        return Ok(PipelineOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Err(CommandException::ProcessExecution {
        command: stage.to_string(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}
