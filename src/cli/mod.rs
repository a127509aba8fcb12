//! Command-line interface definitions for the `voluma` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `voluma` binary.
#[derive(Debug, Parser)]
#[command(
    name = "voluma",
    about = "Grow a cloud machine's primary block volume in place",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Resize a machine's primary volume without losing data.
    #[command(
        name = "resize",
        about = "Snapshot, regrow, and swap a machine's primary volume"
    )]
    Resize(ResizeCommand),
    /// Delete orphaned resize volumes and snapshots.
    #[command(
        name = "sweep",
        about = "Delete orphaned voluma-tagged volumes and snapshots"
    )]
    Sweep,
}

/// Arguments for the `voluma resize` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ResizeCommand {
    /// Provider identifier of the machine to resize.
    #[arg(long, value_name = "ID")]
    pub(crate) machine_id: String,
    /// Desired size of the primary volume, in gigabytes.
    ///
    /// Must be strictly larger than the current size and within the
    /// configured ceiling; the workflow validates both before touching any
    /// provider resource.
    #[arg(long, value_name = "GB")]
    pub(crate) size_gb: u32,
    /// Domain name to point at the resized machine.
    #[arg(long, value_name = "DOMAIN")]
    pub(crate) domain: String,
    /// Username recorded against the domain update.
    #[arg(long, value_name = "USER")]
    pub(crate) user: String,
}
