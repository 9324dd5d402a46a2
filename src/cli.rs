//! Command-line surface. Adapted from the teacher's `Cli`/`Commands`
//! pair: a shared set of top-level options (here just `--config`) and a
//! `Subcommand` enum, rather than the teacher's per-subcommand
//! `SharedOpts` flatten (this server has no `--debug` flag separate from
//! `log_level` in the config file).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nsblast", version, about = "An authoritative DNS name server with a REST control plane and primary/follower replication.")]
pub struct Cli {
    /// Path to the JSON config file. Defaults to ./nsblast.json or
    /// ~/.config/nsblast.json if unset.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the DNS and admin servers.
    Server,
    /// Load the config file, run validation, and report any errors
    /// without starting any listeners.
    ConfigCheck,
    /// Print the effective configuration (file + environment overlay)
    /// as JSON, with secrets redacted.
    ExportConfig,
    /// Generate a self-signed TLS certificate/key pair for the admin
    /// API, written to the paths given.
    GenerateCert {
        #[arg(long, default_value = "./certificates/cert.pem")]
        cert_path: String,
        #[arg(long, default_value = "./certificates/key.pem")]
        key_path: String,
        /// Hostname the certificate is issued for.
        #[arg(long)]
        hostname: Option<String>,
    },
}
