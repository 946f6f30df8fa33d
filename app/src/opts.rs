use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Parser)]
#[command(name = "papertraild", about = "Papertrail connectivity daemon")]
pub struct Opts {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Run the connectivity daemon
    #[command(name = "daemon", alias = "d")]
    Daemon,

    #[command(flatten)]
    Command(CommandOpts),

    #[command(flatten)]
    Listen(SubscribeOpts),
}

#[derive(Clone, Debug, Deserialize, Serialize, Subcommand)]
pub enum CommandOpts {
    /// Stop a running daemon
    #[command(name = "kill", alias = "k")]
    Kill,

    /// Check whether a daemon is running
    #[command(name = "ping")]
    Ping,

    /// Print the daemon's connectivity status as JSON
    #[command(name = "status", alias = "s")]
    Status,

    /// Replace the hotspot target the daemon seeks
    #[command(name = "set-hotspot")]
    SetHotspot { ssid: String, password: String },

    /// List WiFi networks currently in range
    #[command(name = "scan")]
    Scan,

    /// List saved network profiles
    #[command(name = "networks")]
    Networks,

    /// Delete a saved network profile
    #[command(name = "forget")]
    Forget { ssid: String },

    /// Save a network profile without connecting to it
    #[command(name = "save-network")]
    SaveNetwork {
        ssid: String,
        password: Option<String>,
        /// Let NetworkManager join it on its own
        #[arg(long)]
        auto_connect: bool,
    },
}

#[derive(Clone, Copy, Debug, Subcommand)]
pub enum SubscribeOpts {
    /// Stream connectivity state transitions as JSON lines
    #[command(name = "state")]
    State,

    /// Stream connected/disconnected edges as JSON lines
    #[command(name = "connection")]
    Connection,
}

impl Opts {
    pub fn from_env() -> Self {
        Opts::parse()
    }
}
