//! `memfs`: mount an in-memory filesystem.
//!
//! ```text
//! memfs [--protocol N] [--ttl SECS] [-v...] -- MOUNTPOINT [-o opt[,opt...]] [-f] [-d] [-s]
//! ```
//!
//! Everything after `--` is handed to the mount runtime unchanged.

use std::ffi::OsString;
use std::io;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use pathfuse::ProtocolRevision;
use pathfuse_fuser::{FuserRuntime, MountConfig};
use pathfuse_memfs::MemFs;
use tracing_subscriber::EnvFilter;

/// Mount an in-memory filesystem
#[derive(Parser)]
#[command(name = "memfs")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mount on /tmp/mem and stay in the foreground
    memfs -- /tmp/mem -f

    # Speak an older protocol revision
    memfs --protocol 2.5 -- /tmp/mem -o ro
")]
struct Cli {
    /// Protocol revision to serve (e.g. 30, 2.6)
    #[arg(long, value_name = "N", default_value_t = ProtocolRevision::LATEST)]
    protocol: ProtocolRevision,

    /// Attribute and entry cache lifetime in seconds
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    ttl: u64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Mount arguments: MOUNTPOINT followed by mount options
    #[arg(last = true, value_name = "MOUNT_ARGS")]
    mount_args: Vec<OsString>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = MountConfig::for_revision(cli.protocol)
        .ttl(Duration::from_secs(cli.ttl))
        .subtype("memfs");
    let runtime = FuserRuntime::new(config);

    let args = std::iter::once(OsString::from("memfs")).chain(cli.mount_args);
    let status = pathfuse::main(MemFs::new(), args, runtime);
    ExitCode::from(u8::try_from(status).unwrap_or(1))
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
