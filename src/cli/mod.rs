//! CLI module for the knowledge base access gateway

pub mod serve;

use clap::{Parser, Subcommand};

/// Knowledge base access gateway - delegated tokens, sharing and ingestion sync
#[derive(Parser)]
#[command(name = "kb-access-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(serve::ServeArgs),
}
