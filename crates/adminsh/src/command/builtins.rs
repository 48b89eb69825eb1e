//! Built-in console commands.

use async_trait::async_trait;
use tracing::info;

use super::{Arity, Command, CommandError, CommandHandler, Invocation, ReplySink};
use crate::servers::ConfigUpdate;

/// Returns the built-in commands in help-listing order.
pub fn builtin_commands() -> Vec<Command> {
    vec![
        Command::new(
            "help",
            Arity::Range { min: 1, max: 2 },
            "[cmd]",
            "Shows this help (or help for a given command)",
            Help,
        ),
        Command::new("start", Arity::Exact(2), "<id>", "Starts the server", Start),
        Command::new("stop", Arity::Exact(2), "<id>", "Stops the server", Stop),
        Command::new(
            "restart",
            Arity::Exact(2),
            "<id>",
            "Restarts the server",
            Restart,
        ),
        Command::new(
            "supw",
            Arity::Exact(3),
            "<id> <password>",
            "Set the SuperUser password",
            SetSuperUserPassword,
        ),
        Command::new(
            "setconf",
            Arity::Exact(4),
            "<id> <key> <value>",
            "Set a config value for the key",
            SetConf,
        ),
        Command::new(
            "getconf",
            Arity::Exact(3),
            "<id> <key>",
            "Get the config value identified by key",
            GetConf,
        ),
        Command::new(
            "clearconf",
            Arity::Exact(3),
            "<id> <key>",
            "Resets the config value identified by key to its default value",
            ClearConf,
        ),
    ]
}

/// `help [cmd]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let only = invocation.arg(1);
        let mut shown = false;

        for cmd in invocation.registry().iter() {
            if only.is_none_or(|name| name == cmd.name()) {
                write!(
                    reply,
                    "\r\n {} {}\r\n    {}\r\n",
                    cmd.name(),
                    cmd.usage(),
                    cmd.description()
                );
                shown = true;
            }
        }

        if only.is_some() && !shown {
            return Err(CommandError::NoSuchCommand);
        }
        write!(reply, "\r\n");
        Ok(())
    }
}

/// `start <id>`
#[derive(Debug, Clone, Copy, Default)]
pub struct Start;

#[async_trait]
impl CommandHandler for Start {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        invocation
            .servers()
            .start(id)
            .await
            .map_err(CommandError::StartFailed)?;
        info!(server_id = id, "Server started from console");
        write!(reply, "[{id}] Started\r\n");
        Ok(())
    }
}

/// `stop <id>`
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

#[async_trait]
impl CommandHandler for Stop {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        invocation
            .servers()
            .stop(id)
            .await
            .map_err(CommandError::StopFailed)?;
        info!(server_id = id, "Server stopped from console");
        write!(reply, "[{id}] Stopped\r\n");
        Ok(())
    }
}

/// `restart <id>`: stop, then start. A failed stop skips the start.
#[derive(Debug, Clone, Copy, Default)]
pub struct Restart;

#[async_trait]
impl CommandHandler for Restart {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        let servers = invocation.servers();

        servers.stop(id).await.map_err(CommandError::StopFailed)?;
        write!(reply, "[{id}] Stopped\r\n");

        servers.start(id).await.map_err(CommandError::StartFailed)?;
        write!(reply, "[{id}] Started\r\n");

        info!(server_id = id, "Server restarted from console");
        Ok(())
    }
}

/// `supw <id> <password>`
#[derive(Debug, Clone, Copy, Default)]
pub struct SetSuperUserPassword;

#[async_trait]
impl CommandHandler for SetSuperUserPassword {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        let password = invocation.arg(2).unwrap_or_default();
        invocation.servers().set_superuser_password(id, password);
        write!(reply, "[{id}] SuperUser password updated.\r\n");
        Ok(())
    }
}

/// `setconf <id> <key> <value>`
#[derive(Debug, Clone, Copy, Default)]
pub struct SetConf;

#[async_trait]
impl CommandHandler for SetConf {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        let key = invocation.arg(2).unwrap_or_default();
        let value = invocation.arg(3).unwrap_or_default();

        let servers = invocation.servers();
        servers.set_config(id, key, value);
        servers.publish_config_update(id, ConfigUpdate::set(key, value));

        write!(reply, "[{id}] {key} = {value}\r\n");
        Ok(())
    }
}

/// `getconf <id> <key>`
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConf;

#[async_trait]
impl CommandHandler for GetConf {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        let key = invocation.arg(2).unwrap_or_default();
        let value = invocation.servers().get_config(id, key);
        write!(reply, "[{id}] {key} = {value}\r\n");
        Ok(())
    }
}

/// `clearconf <id> <key>`
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearConf;

#[async_trait]
impl CommandHandler for ClearConf {
    async fn call(
        &self,
        invocation: &Invocation<'_>,
        reply: &mut dyn ReplySink,
    ) -> Result<(), CommandError> {
        let id = invocation.server_id()?;
        let key = invocation.arg(2).unwrap_or_default();

        let servers = invocation.servers();
        servers.reset_config(id, key);
        servers.publish_config_update(id, ConfigUpdate::reset(key));

        write!(reply, "[{id}] Cleared value for {key}\r\n");
        Ok(())
    }
}
