//! Binary entry point. Adapted from the teacher's `main.rs`: parse
//! `Cli`, dispatch on `Commands`, load config before doing anything
//! else. The teacher's sqlite pool + session-store bring-up is replaced
//! with opening the storage engine and spawning the DNS/admin servers.

use clap::Parser;
use nsblast::ack_timer::AckTimerConfig;
use nsblast::cli::{Cli, Commands};
use nsblast::config::{check_config, ServerConfig};
use nsblast::notifier::Notifier;
use nsblast::storage::Engine;
use nsblast::web;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ConfigCheck => {
            nsblast::logging::init("warn");
            let config = ServerConfig::load(cli.config.as_deref())?.into_cowcell();
            let errors = check_config(&config.read());
            if errors.is_empty() {
                println!("config OK");
                Ok(())
            } else {
                for e in &errors {
                    eprintln!("{e}");
                }
                std::process::exit(1);
            }
        }
        Commands::ExportConfig => {
            nsblast::logging::init("warn");
            let mut config = ServerConfig::load(cli.config.as_deref())?;
            config.admin_password = "<redacted>".to_string();
            config.cluster_auth_key = "<redacted>".to_string();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::GenerateCert { cert_path, key_path, hostname } => {
            nsblast::logging::init("info");
            generate_cert(&cert_path, &key_path, hostname.as_deref())?;
            println!("wrote {cert_path} and {key_path}");
            Ok(())
        }
        Commands::Server => {
            let config = ServerConfig::load(cli.config.as_deref())?;
            nsblast::logging::init(&config.log_level);
            run_server(config).await
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(Engine::open(&config.storage_path)?);
    let zones = Arc::new(RwLock::new(nsblast::zones::ZoneSet::default()));

    let dns_server = nsblast::servers::DnsServer::new(engine.clone(), config.any_response_mode);
    let dns_addr = config.dns_listen_addr()?;

    let notifier = Arc::new(Notifier::new(AckTimerConfig::default()));
    let admin_state = web::AppState {
        engine: engine.clone(),
        zones: zones.clone(),
        admin_password: Arc::from(config.admin_password.as_str()),
        backup_dir: Arc::from(config.backup_path.as_path()),
        notifier,
    };
    let admin_addr = config.admin_listen_addr()?;
    let admin_router = web::new(admin_state);

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn({
        let dns_server = dns_server.clone();
        async move {
            if let Err(e) = dns_server.run_udp(dns_addr).await {
                error!(error = %e, "udp listener stopped");
            }
        }
    }));
    tasks.push(tokio::spawn({
        let dns_server = dns_server.clone();
        async move {
            if let Err(e) = dns_server.run_tcp(dns_addr).await {
                error!(error = %e, "tcp listener stopped");
            }
        }
    }));
    tasks.push(tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(admin_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "admin listener failed to bind");
                return;
            }
        };
        if let Err(e) = axum::serve(listener, admin_router).await {
            error!(error = %e, "admin server stopped");
        }
    }));

    if let Some(listen) = config.replication_listen {
        let primary = nsblast::replication::ReplicationPrimary::new(
            engine.clone(),
            std::time::Duration::from_secs(config.replication_poll_interval_secs),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = primary.serve(listen).await {
                error!(error = %e, "replication primary stopped");
            }
        }));
    }

    info!(dns = %dns_addr, admin = %admin_addr, "nsblast started");
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn generate_cert(cert_path: &str, key_path: &str, hostname: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let subject_alt_names = vec![hostname.map(str::to_string).unwrap_or_else(|| "localhost".to_string())];
    let certified_key = rcgen::generate_simple_self_signed(subject_alt_names)?;
    if let Some(parent) = std::path::Path::new(cert_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = std::path::Path::new(key_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(cert_path, certified_key.cert.pem())?;
    std::fs::write(key_path, certified_key.key_pair.serialize_pem())?;
    Ok(())
}
