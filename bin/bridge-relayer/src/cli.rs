use std::path::PathBuf;

use clap::{Parser, Subcommand};
use storage::Chain;

#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
pub struct Args {
    /// TOML configuration file; the environment is read if not given.
    #[arg(long)]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Makes an event whose relaying failed too often eligible again.
    ResetFailed {
        /// Chain the event was emitted on, `l1` or `l2`.
        #[arg(long)]
        chain: Chain,

        /// Row id of the event.
        #[arg(long)]
        id: i64,
    },
}
