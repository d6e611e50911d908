use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_GAME_KEYWORD, DEFAULT_LISTEN, DEFAULT_MAX_OPERAND, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_GRACE_MS, DeliveryPolicy, IdentityMode, RelayConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting line-oriented TCP clients.
    Serve(ServeArgs),
    /// Connect to a relay from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Lines buffered per client before the delivery policy applies.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// What to do when a client's outbound queue is full.
    #[arg(long, value_enum, default_value_t = DeliveryPolicy::Block)]
    pub delivery: DeliveryPolicy,

    /// How clients are named in chat lines.
    #[arg(long, value_enum, default_value_t = IdentityMode::Address)]
    pub identity: IdentityMode,

    /// Console line that starts a new math game.
    #[arg(long, default_value = DEFAULT_GAME_KEYWORD)]
    pub game_keyword: String,

    /// Upper bound (exclusive) for math game operands.
    #[arg(long, default_value_t = DEFAULT_MAX_OPERAND)]
    pub max_operand: u32,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    pub no_console: bool,

    /// Milliseconds a stopping relay waits for connections to flush before
    /// aborting them.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,
}

impl From<ServeArgs> for RelayConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: args.listen,
            queue_capacity: args.queue_capacity,
            delivery: args.delivery,
            identity: args.identity,
            game_keyword: args.game_keyword,
            max_operand: args.max_operand,
            console: !args.no_console,
            shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the relay to connect to.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub server: SocketAddr,

    /// Display name sent as the first line, for relays running with `--identity name`.
    #[arg(long)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_map_to_config() {
        let cli = Cli::try_parse_from(["line-chat-relay", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = RelayConfig::from(args);
        assert_eq!(config.listen, RelayConfig::default().listen);
        assert_eq!(config.delivery, DeliveryPolicy::Block);
        assert_eq!(config.identity, IdentityMode::Address);
        assert_eq!(config.game_keyword, "game");
        assert!(config.console);
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn serve_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "line-chat-relay",
            "serve",
            "--listen",
            "0.0.0.0:9000",
            "--delivery",
            "drop",
            "--identity",
            "name",
            "--queue-capacity",
            "16",
            "--max-operand",
            "50",
            "--no-console",
            "--shutdown-grace-ms",
            "250",
        ])
        .expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = RelayConfig::from(args);
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.delivery, DeliveryPolicy::Drop);
        assert_eq!(config.identity, IdentityMode::Name);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.max_operand, 50);
        assert!(!config.console);
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
    }
}
