use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{SystemError, SystemResult};

/// Variables a tool server inherits from this process. Everything else must be configured.
#[cfg(unix)]
pub const INHERITED_ENV_VARS: &[&str] = &[
    "HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER", "LANG", "TMPDIR",
];

#[cfg(windows)]
pub const INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A bidirectional message channel to a tool server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message
    async fn send(&self, message: Value) -> SystemResult<()>;

    /// Wait for the next message from the peer
    async fn receive(&self) -> SystemResult<Value>;

    /// Close the channel; later sends fail with `ChannelClosed`
    async fn close(&self) -> SystemResult<()>;
}

/// Newline-delimited JSON over any reader/writer pair
pub struct LineTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<Option<W>>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: Value) -> SystemResult<()> {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SystemError::ChannelClosed)?;
        match writer.write_all(line.as_bytes()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Err(SystemError::ChannelClosed)
            }
            Err(e) => return Err(e.into()),
        }
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> SystemResult<Value> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(SystemError::ChannelClosed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map_err(|e| SystemError::MalformedMessage(format!("{}: {}", e, trimmed)));
        }
    }

    async fn close(&self) -> SystemResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// A fully resolved command line for starting a tool server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ServerCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// The suffix key for server files without an extension
pub const NO_SUFFIX: &str = "";

/// How a tool server of one kind is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Run the server file with this interpreter
    Interpreter(String),
    /// Execute the server file itself
    Native,
}

impl Launch {
    /// An empty program means the file runs on its own
    pub fn from_program<P: Into<String>>(program: P) -> Self {
        let program = program.into();
        if program.trim().is_empty() {
            Launch::Native
        } else {
            Launch::Interpreter(program)
        }
    }
}

/// The supported tool server kinds, keyed by file suffix.
///
/// Extensionless files are native executables by default, so a compiled
/// server such as `target/debug/weather-server` launches as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Launchers {
    kinds: BTreeMap<String, Launch>,
}

impl Default for Launchers {
    fn default() -> Self {
        let launchers = Self::empty()
            .with_launcher("py", "python")
            .with_launcher("js", "node")
            .with_native(NO_SUFFIX);
        #[cfg(windows)]
        let launchers = launchers.with_native("exe");
        launchers
    }
}

impl Launchers {
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// Register `suffix`; an empty `program` registers it as native
    pub fn with_launcher<S: Into<String>, P: Into<String>>(self, suffix: S, program: P) -> Self {
        self.with_kind(suffix, Launch::from_program(program))
    }

    pub fn with_native<S: Into<String>>(self, suffix: S) -> Self {
        self.with_kind(suffix, Launch::Native)
    }

    pub fn with_kind<S: Into<String>>(mut self, suffix: S, launch: Launch) -> Self {
        let suffix = suffix.into();
        let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
        self.kinds.insert(suffix, launch);
        self
    }

    pub fn suffixes(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn kind(&self, suffix: &str) -> Option<&Launch> {
        self.kinds.get(suffix)
    }

    /// Map a server file to the command that runs it. Nothing is spawned here.
    pub fn resolve(&self, script: &Path) -> SystemResult<ServerCommand> {
        let unsupported = || SystemError::UnsupportedServerKind(script.display().to_string());
        let suffix = match script.extension() {
            None => NO_SUFFIX.to_string(),
            Some(ext) => ext.to_str().ok_or_else(unsupported)?.to_ascii_lowercase(),
        };

        match self.kinds.get(&suffix).ok_or_else(unsupported)? {
            Launch::Interpreter(program) => {
                Ok(ServerCommand::new(program.as_str()).with_arg(script.to_string_lossy()))
            }
            Launch::Native => Ok(ServerCommand::new(native_program(script))),
        }
    }
}

// A bare file name would be looked up on PATH instead of in the working directory
fn native_program(script: &Path) -> String {
    match script.parent() {
        Some(parent) if parent.as_os_str().is_empty() => {
            Path::new(".").join(script).to_string_lossy().into_owned()
        }
        _ => script.to_string_lossy().into_owned(),
    }
}

/// A tool server child process and the line channel over its stdio
pub struct StdioTransport {
    program: String,
    channel: LineTransport<BufReader<ChildStdout>, ChildStdin>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Start the server with a cleared environment plus `INHERITED_ENV_VARS` and `command.env`
    pub fn spawn(command: &ServerCommand) -> SystemResult<Self> {
        let spawn_error = |source| SystemError::Spawn {
            program: command.program.clone(),
            source,
        };

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .env_clear()
            .envs(
                INHERITED_ENV_VARS
                    .iter()
                    .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
            )
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = process.spawn().map_err(spawn_error)?;
        let missing_pipe =
            || spawn_error(std::io::Error::new(std::io::ErrorKind::Other, "stdio not piped"));
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let stdout = child.stdout.take().ok_or_else(missing_pipe)?;

        info!(program = %command.program, args = ?command.args, pid = ?child.id(), "started tool server");

        Ok(Self {
            program: command.program.clone(),
            channel: LineTransport::new(BufReader::new(stdout), stdin),
            child: Mutex::new(Some(child)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> SystemResult<()> {
        self.channel.send(message).await
    }

    async fn receive(&self) -> SystemResult<Value> {
        self.channel.receive().await
    }

    /// Closing stdin asks the server to exit; it is killed if it lingers
    async fn close(&self) -> SystemResult<()> {
        self.channel.close().await?;

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => debug!(program = %self.program, status = ?status?, "tool server exited"),
            Err(_) => {
                warn!(program = %self.program, "tool server did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Resolve the script through `launchers` and start it
pub fn connect(
    script: &Path,
    launchers: &Launchers,
    env: &BTreeMap<String, String>,
) -> SystemResult<StdioTransport> {
    let command = launchers.resolve(script)?.with_envs(env);
    StdioTransport::spawn(&command)
}
