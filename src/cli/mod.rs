//! CLI module - Command-line interface for Pawgate
//!
//! This module provides a structured CLI using clap for argument parsing.

use clap::{Parser, Subcommand};

/// Pawgate - authentication and access control for shelter volunteer teams
#[derive(Parser, Debug)]
#[command(name = "pawgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP service (default)
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Create the first site administrator and print its setup link
    BootstrapAdmin {
        /// Login name of the administrator
        username: String,
        /// Address the account is registered under
        email: String,
    },
}

impl Cli {
    /// The subcommand to run; no subcommand means serve.
    #[must_use]
    pub fn command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}
