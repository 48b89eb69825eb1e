//! Ordered, write-once command table.

use tracing::debug;

use super::Command;
use super::builtins::builtin_commands;
use crate::{Error, Result};

/// Words the shell handles itself; they cannot be registered as commands.
pub const RESERVED_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Ordered table of commands.
///
/// Insertion order is the order `help` lists commands in. Names are unique:
/// registering a name twice is rejected instead of being shadowed.
/// The registry is filled before serving starts and then shared behind an
/// `Arc`, so sessions only ever see it immutably.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in commands.
    pub fn with_builtins() -> Self {
        Self {
            commands: builtin_commands(),
        }
    }

    /// Appends a command.
    ///
    /// # Errors
    ///
    /// [`Error::ReservedCommand`] for `exit`/`quit`, and
    /// [`Error::DuplicateCommand`] if the name is already registered.
    pub fn register(&mut self, command: Command) -> Result<()> {
        if RESERVED_COMMANDS.contains(&command.name()) {
            return Err(Error::ReservedCommand(command.name().to_string()));
        }
        if self.lookup(command.name()).is_some() {
            return Err(Error::DuplicateCommand(command.name().to_string()));
        }
        debug!(command = command.name(), "Command registered");
        self.commands.push(command);
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn with_command(mut self, command: Command) -> Result<Self> {
        self.register(command)?;
        Ok(self)
    }

    /// Finds a command by exact, case-sensitive name.
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name() == name)
    }

    /// Iterates commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Returns command names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(Command::name).collect()
    }

    /// Returns the number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
