//! CLI argument definitions.

use std::path::PathBuf;

use agenthub::server;
use clap::{Parser, Subcommand};

/// Agenthub - chat with published agents from the terminal
#[derive(Parser, Debug)]
#[command(name = "agenthub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.agenthub/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend API root, e.g. http://127.0.0.1:58240/api
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List published agents
    Agents {
        /// Only agents whose name contains this text
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show the stored messages of a session
    History {
        /// Session ID
        session_id: String,
    },

    /// Send a message and stream the reply (Ctrl-C stops the reply)
    Chat {
        /// Agent to talk to
        agent: String,

        /// Continue this session instead of the most recent one
        #[arg(short, long)]
        session: Option<String>,

        /// Message to send
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Ask questions against local documents
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Run an in-memory backend for local use
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = server::DEFAULT_PORT)]
        port: u16,

        /// Pause between streamed fragments, in milliseconds
        #[arg(long, default_value = "40")]
        delay_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List sessions of an agent
    List {
        agent: String,

        /// Show archived sessions instead
        #[arg(long)]
        archived: bool,
    },

    /// Create a session
    New { agent: String },

    /// Rename a session
    Rename {
        id: String,

        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },

    /// Archive a session
    Archive { id: String },

    /// Restore an archived session
    Unarchive { id: String },

    /// Delete a session
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum KbAction {
    /// Answer a question from the given files
    Ask {
        /// Document to search (repeatable)
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Question
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
}
