//! Console commands.
//!
//! A [`Command`] binds a name to a [`CommandHandler`] together with its
//! arity and the usage text shown by `help`. Commands live in a
//! [`CommandRegistry`] that is built once at startup and shared read-only by
//! every session.
//!
//! # Example
//!
//! ```rust,ignore
//! use adminsh::command::{Arity, Command, CommandRegistry};
//!
//! let mut registry = CommandRegistry::with_builtins();
//! registry.register(Command::from_fn(
//!     "ping",
//!     Arity::Exact(1),
//!     "",
//!     "Replies with pong",
//!     |_inv, reply| {
//!         write!(reply, "pong\r\n");
//!         Ok(())
//!     },
//! ))?;
//! ```

mod builtins;
mod registry;
mod reply;

pub use builtins::{
    ClearConf, GetConf, Help, Restart, SetConf, SetSuperUserPassword, Start, Stop,
    builtin_commands,
};
pub use registry::{CommandRegistry, RESERVED_COMMANDS};
pub use reply::{REPLY_CHUNK_SIZE, ReplyBuffer, ReplySink};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::servers::{ServerError, ServerId, ServerRegistry};

/// Errors a command reports back to the peer.
///
/// The `Display` text is what follows `error: ` on the reply line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Wrong number of words for the command.
    #[error("argument count mismatch")]
    ArgumentCountMismatch,

    /// The server id is not a base-10 integer.
    #[error("bad server id")]
    BadServerId,

    /// No server is registered under the id.
    #[error("no such server")]
    NoSuchServer,

    /// `help` was asked about an unregistered command.
    #[error("no such command")]
    NoSuchCommand,

    /// The first word of a line names no registered command.
    #[error("unknown command")]
    UnknownCommand,

    /// The server refused to start.
    #[error("unable to start: {0}")]
    StartFailed(#[source] ServerError),

    /// The server refused to stop.
    #[error("unable to stop: {0}")]
    StopFailed(#[source] ServerError),

    /// Free-form failure from a custom command.
    #[error("{0}")]
    Failed(String),
}

/// Accepted word counts for a command, including the command name itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many words.
    Exact(usize),
    /// Between `min` and `max` words, inclusive.
    Range {
        /// Fewest words accepted.
        min: usize,
        /// Most words accepted.
        max: usize,
    },
}

impl Arity {
    /// Returns true if `count` words satisfy this arity.
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range { min, max } => (min..=max).contains(&count),
        }
    }
}

/// Everything a handler can see while running.
pub struct Invocation<'a> {
    args: &'a [String],
    registry: &'a CommandRegistry,
    servers: &'a dyn ServerRegistry,
}

impl<'a> Invocation<'a> {
    /// Creates an invocation. `args[0]` is the command name.
    pub fn new(
        args: &'a [String],
        registry: &'a CommandRegistry,
        servers: &'a dyn ServerRegistry,
    ) -> Self {
        Self {
            args,
            registry,
            servers,
        }
    }

    /// Returns all words, command name included.
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    /// Returns the word at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns the command registry.
    pub fn registry(&self) -> &'a CommandRegistry {
        self.registry
    }

    /// Returns the managed server registry.
    pub fn servers(&self) -> &'a dyn ServerRegistry {
        self.servers
    }

    /// Parses the second word as a server id and checks that it exists.
    ///
    /// # Errors
    ///
    /// [`CommandError::BadServerId`] if the word is missing or not an
    /// integer, [`CommandError::NoSuchServer`] if the id is unknown.
    pub fn server_id(&self) -> Result<ServerId, CommandError> {
        let id = self
            .arg(1)
            .and_then(|word| word.parse::<ServerId>().ok())
            .ok_or(CommandError::BadServerId)?;
        if self.servers.exists(id) {
            Ok(id)
        } else {
            Err(CommandError::NoSuchServer)
        }
    }
}

/// Trait implemented by command handlers.
///
/// Handlers write their output into `reply` and return `Ok(())`, or return
/// an error whose message is sent to the peer instead. Output written before
/// an error is discarded.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command.
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError>;
}

/// Adapter turning a synchronous closure into a [`CommandHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Invocation<'_>, &mut dyn ReplySink) -> Result<(), CommandError> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&Invocation<'_>, &mut dyn ReplySink) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
{
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        (self.f)(invocation, reply)
    }
}

/// A named command.
#[derive(Clone)]
pub struct Command {
    name: String,
    arity: Arity,
    usage: String,
    description: String,
    handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("usage", &self.usage)
            .field("description", &self.description)
            .finish()
    }
}

impl Command {
    /// Creates a command from a handler.
    pub fn new<H: CommandHandler + 'static>(
        name: impl Into<String>,
        arity: Arity,
        usage: impl Into<String>,
        description: impl Into<String>,
        handler: H,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            usage: usage.into(),
            description: description.into(),
            handler: Arc::new(handler),
        }
    }

    /// Creates a command from a synchronous closure.
    pub fn from_fn<F>(
        name: impl Into<String>,
        arity: Arity,
        usage: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>, &mut dyn ReplySink) -> Result<(), CommandError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, arity, usage, description, FnHandler::new(f))
    }

    /// Returns the command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the accepted word count.
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Returns the usage hint, e.g. `<id> <key>`.
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// Returns the one-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks the word count and runs the handler.
    ///
    /// # Errors
    ///
    /// [`CommandError::ArgumentCountMismatch`] before the handler runs if the
    /// word count is wrong, otherwise whatever the handler returns.
    pub async fn invoke(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        if !self.arity.accepts(invocation.args().len()) {
            return Err(CommandError::ArgumentCountMismatch);
        }
        self.handler.call(invocation, reply).await
    }
}
