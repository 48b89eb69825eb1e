//! Per-channel console shell.
//!
//! A [`Shell`] reads lines from a channel stream, splits them into words,
//! looks the first word up in the [`CommandRegistry`] and writes the reply
//! back. `exit` and `quit` end the session. Any write failure also ends it.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::command::{CommandError, CommandRegistry, Invocation, RESERVED_COMMANDS, ReplyBuffer};
use crate::servers::ServerRegistry;
use crate::session::SessionLease;
use crate::terminal::LineEditor;

/// Prompt shown to interactive (PTY) sessions.
pub const DEFAULT_PROMPT: &str = "> ";

/// Splits a line into whitespace-separated words.
pub fn parse_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

/// Formats an error reply line.
pub fn error_line(err: &CommandError) -> String {
    format!("error: {err}\r\n")
}

/// How a shell presents itself on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOptions {
    /// Prompt written before each line, if any.
    pub prompt: Option<String>,
    /// Echo input back to the peer.
    pub echo: bool,
}

impl ShellOptions {
    /// Options for a session that requested a PTY.
    pub fn interactive() -> Self {
        Self {
            prompt: Some(DEFAULT_PROMPT.to_string()),
            echo: true,
        }
    }

    /// Sets the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Result of dispatching one line.
#[derive(Debug)]
pub enum Outcome {
    /// The line held no words.
    Empty,
    /// The peer asked to end the session.
    Exit,
    /// The command succeeded with this reply.
    Reply(ReplyBuffer),
    /// The command failed.
    Failed(CommandError),
}

impl Outcome {
    /// Exit status reported for a one-shot command.
    pub fn exit_status(&self) -> u32 {
        match self {
            Outcome::Failed(_) => 1,
            _ => 0,
        }
    }
}

/// Why a shell loop ended.
#[derive(Debug)]
pub enum ShellExit {
    /// The peer closed its side of the channel.
    Eof,
    /// The peer typed `exit` or `quit`.
    Exit,
    /// Reading from the channel failed.
    ReadError(io::Error),
    /// Writing to the channel failed.
    WriteError(io::Error),
}

impl ShellExit {
    /// Exit status reported when the shell's channel closes.
    pub fn exit_status(&self) -> u32 {
        match self {
            ShellExit::Eof | ShellExit::Exit => 0,
            ShellExit::ReadError(_) | ShellExit::WriteError(_) => 1,
        }
    }
}

impl fmt::Display for ShellExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellExit::Eof => f.write_str("end of input"),
            ShellExit::Exit => f.write_str("exit requested"),
            ShellExit::ReadError(e) => write!(f, "read error: {e}"),
            ShellExit::WriteError(e) => write!(f, "write error: {e}"),
        }
    }
}

/// Command interpreter bound to one channel.
///
/// A shell may own the channel's [`SessionLease`]; the session stays open
/// until the shell is dropped.
pub struct Shell {
    registry: Arc<CommandRegistry>,
    servers: Arc<dyn ServerRegistry>,
    options: ShellOptions,
    lease: Option<SessionLease>,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("commands", &self.registry.len())
            .field("options", &self.options)
            .field("session", &self.lease.as_ref().map(SessionLease::id))
            .finish()
    }
}

impl Shell {
    /// Creates a shell over a registry and the servers it manages.
    pub fn new(registry: Arc<CommandRegistry>, servers: Arc<dyn ServerRegistry>) -> Self {
        Self {
            registry,
            servers,
            options: ShellOptions::default(),
            lease: None,
        }
    }

    /// Attaches the session slot this shell runs in.
    pub fn with_lease(mut self, lease: SessionLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Sets the presentation options.
    pub fn with_options(mut self, options: ShellOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the presentation options.
    pub fn options(&self) -> &ShellOptions {
        &self.options
    }

    /// Runs one line: parse, look up, invoke.
    pub async fn dispatch(&self, line: &str) -> Outcome {
        let args = parse_words(line);
        let Some(name) = args.first() else {
            return Outcome::Empty;
        };

        if RESERVED_COMMANDS.contains(&name.as_str()) {
            return Outcome::Exit;
        }

        if let Some(lease) = &self.lease {
            lease.record_command();
        }

        let Some(command) = self.registry.lookup(name) else {
            debug!(command = %name, "Unknown command");
            return Outcome::Failed(CommandError::UnknownCommand);
        };

        trace!(command = %name, args = args.len(), "Dispatching command");
        let invocation = Invocation::new(&args, &self.registry, self.servers.as_ref());
        let mut reply = ReplyBuffer::new();
        match command.invoke(&invocation, &mut reply).await {
            Ok(()) => Outcome::Reply(reply),
            Err(err) => {
                debug!(command = %name, error = %err, "Command failed");
                Outcome::Failed(err)
            }
        }
    }

    /// Writes the visible result of `outcome` to `writer`.
    ///
    /// # Errors
    ///
    /// Returns the first write or flush failure.
    pub async fn write_outcome<W>(&self, outcome: &Outcome, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match outcome {
            Outcome::Empty | Outcome::Exit => Ok(()),
            Outcome::Reply(reply) => reply.flush_to(writer).await,
            Outcome::Failed(err) => {
                writer.write_all(error_line(err).as_bytes()).await?;
                writer.flush().await
            }
        }
    }

    /// Serves lines from `stream` until the peer leaves or a write fails.
    pub async fn run<S>(&self, stream: &mut S) -> ShellExit
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let mut editor = LineEditor::new(self.options.echo);

        loop {
            if let Some(prompt) = &self.options.prompt {
                let written = async {
                    stream.write_all(prompt.as_bytes()).await?;
                    stream.flush().await
                };
                if let Err(e) = written.await {
                    return ShellExit::WriteError(e);
                }
            }

            let line = match editor.read_line(stream).await {
                Ok(Some(line)) => line,
                Ok(None) => return ShellExit::Eof,
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    return ShellExit::ReadError(e);
                }
            };

            let outcome = self.dispatch(&line).await;
            if matches!(outcome, Outcome::Exit) {
                return ShellExit::Exit;
            }
            if let Err(e) = self.write_outcome(&outcome, stream).await {
                debug!(error = %e, "Console write failed");
                return ShellExit::WriteError(e);
            }
        }
    }
}
