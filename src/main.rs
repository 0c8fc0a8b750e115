mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use vs_av::{FfmpegTools, MediaTools, ToolRegistry};
use vs_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidstash=trace,vs_server=trace,vs_av=debug,vs_db=debug,vs_core=debug,tower_http=debug"
                .to_string()
        } else {
            "vidstash=info,vs_server=info,vs_av=info,vs_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(config_path);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(vs_server::start(config))?;
            Ok(())
        }
        Commands::CreateUser { username, channel } => {
            create_user(config_path, &username, channel.as_deref())
        }
        Commands::Probe { file, json } => probe_file(config_path, &file, json),
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate => validate_config(config_path),
        Commands::Version => {
            println!("vidstash {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn tool_registry(config: &Config) -> ToolRegistry {
    let timeout = Duration::from_secs(config.derivatives.tool_timeout_secs.max(1));
    ToolRegistry::discover(&config.tools, timeout)
}

fn create_user(config_path: Option<&Path>, username: &str, channel: Option<&str>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = vs_db::pool::init_pool(&config.server.db_path)
        .with_context(|| format!("opening database {}", config.server.db_path.display()))?;
    let conn = vs_db::pool::get_conn(&db)?;

    let user = vs_db::queries::users::create_user(&conn, username)?;
    let channel = vs_db::queries::channels::create_channel(&conn, user.id, channel.unwrap_or(username))?;
    let token = vs_db::queries::auth::issue_token(&conn, user.id, config.auth.token_ttl_hours)?;

    println!("User:    {} ({})", user.username, user.id);
    println!("Channel: {} ({})", channel.name, channel.id);
    println!("Token:   {}", token.token);
    println!("Expires: {}", token.expires_at);
    Ok(())
}

fn probe_file(config_path: Option<&Path>, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let config = Config::load_or_default(config_path);
    let tools = FfmpegTools::new(tool_registry(&config));
    let rt = tokio::runtime::Runtime::new()?;
    let meta = rt
        .block_on(tools.probe(file))
        .with_context(|| format!("probing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        let secs = meta.duration_secs.max(0.0) as u64;
        println!("File: {}", file.display());
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.3}s)",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            meta.duration_secs
        );
        println!("Resolution: {}", meta.resolution());
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let mut all_ok = true;

    for tool in tool_registry(&config).check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available.");
    } else {
        println!("Some tools are missing; thumbnails will use placeholders.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Asset root: {}", config.storage.asset_root.display());
    println!("  Auth enabled: {}", config.auth.enabled);
    println!("  Workers: {}", config.worker.concurrency);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("⚠ {warning}");
        }
    }

    Ok(())
}
