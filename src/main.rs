mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use streambox::server;
use streambox_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG when set; otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streambox=trace,streambox_db=debug,tower_http=debug".to_string()
        } else {
            "streambox=info,streambox_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::start(config))?;
            Ok(())
        }
        Commands::Validate => {
            let config = Config::load_or_default(cli.config.as_deref());
            println!("Server: {}:{}", config.server.host, config.server.port);
            println!("Database: {}", config.database.path.display());
            println!("Cache root: {}", config.cache.root.display());
            println!(
                "Cache cap: {} GiB, TTL: {} h",
                config.cache.max_bytes / (1024 * 1024 * 1024),
                config.cache.ttl_secs / 3600
            );
            println!(
                "Video extensions: {}",
                config.library.video_extensions.join(", ")
            );
            println!("Auto-enrich: {}", config.metadata.auto_enrich);

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("\nConfiguration is valid");
            } else {
                println!("\nWarnings:");
                for warning in &warnings {
                    println!("  - {warning}");
                }
            }
            Ok(())
        }
        Commands::HashPassword { password } => {
            println!("{}", streambox::server::auth::hash_password(&password)?);
            Ok(())
        }
        Commands::GenerateSecret => {
            println!("{}", streambox::server::auth::generate_secret());
            Ok(())
        }
    }
}
