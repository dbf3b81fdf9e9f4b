//! ContainerGate CLI
//!
//! Offline tools over a JSON export of the extension's `storage.local`.

mod dump;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use cg_core::prefs::{Schema, SiteRecord};
use cg_core::sites;
use cg_core::types::{CookieStoreId, NavigationRequest};
use cg_core::{Background, PreferenceStore};

use dump::DumpHost;

#[derive(Parser)]
#[command(name = "cg-cli")]
#[command(about = "ContainerGate routing inspector")]
struct Cli {
    /// storage.local export (JSON object keyed by hostname)
    #[arg(short, long, global = true, default_value = "storage.json")]
    storage: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the interceptor would do for a navigation
    Decide {
        /// Destination URL
        url: String,

        /// Container the requesting tab runs in
        #[arg(short, long, default_value = "firefox-default")]
        context: String,

        /// Requesting tab id
        #[arg(short, long, default_value_t = 1)]
        tab: i32,

        /// Extension base URL used for chooser redirects
        #[arg(long, default_value = "moz-extension://containergate/")]
        base: String,
    },

    /// Show the stored record and resolved preference for a hostname
    Resolve {
        hostname: String,
    },

    /// List configured sites
    Sites,

    /// List sites that skip the chooser
    Exceptions,

    /// Show the chooser again for a site (writes the export back)
    Forget {
        hostname: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decide { url, context, tab, base } => cmd_decide(&cli.storage, &url, &context, tab, &base).await,
        Commands::Resolve { hostname } => cmd_resolve(&cli.storage, &hostname).await,
        Commands::Sites => cmd_sites(&cli.storage).await,
        Commands::Exceptions => cmd_exceptions(&cli.storage).await,
        Commands::Forget { hostname } => cmd_forget(&cli.storage, &hostname).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn cmd_decide(storage: &Path, url: &str, context: &str, tab: i32, base: &str) -> Result<(), String> {
    let host = DumpHost::open(storage, base)?;
    let background = Background::new(host);
    let request = NavigationRequest::main_frame(url, tab, CookieStoreId::new(context));

    let rule = background.evaluate(&request).await;
    let decision = background.on_before_request(&request).await;

    println!("Navigation: {url} (tab {tab}, {context})");
    println!("  Rule:      {rule:?}");
    println!("  Response:  {}", decision.to_blocking_response());
    for action in background.host().actions() {
        println!("  Action:    {action}");
    }

    Ok(())
}

async fn cmd_resolve(storage: &Path, hostname: &str) -> Result<(), String> {
    let host = DumpHost::open(storage, "")?;
    let stored = host.get(hostname).await.map_err(|e| e.to_string())?;

    let Some(record) = SiteRecord::from_stored(hostname, stored.as_ref()).map_err(|e| e.to_string())? else {
        println!("{hostname}: no record");
        return Ok(());
    };

    let schema = match record.schema() {
        Schema::V2(_) => "v2",
        Schema::V1 { .. } => "v1 (legacy)",
        Schema::Unconfigured => "unconfigured",
    };

    println!("{hostname}");
    println!("  Schema:     {schema}");
    println!("  Profiles:   {}", record.profiles.len());
    for profile in &record.profiles {
        println!("    [{}] {} -> {}", profile.id, profile.name, profile.cookie_store_id);
    }
    match record.preference().target() {
        Some(target) => println!("  Preference: always open in {target}"),
        None => println!("  Preference: ask every time"),
    }

    Ok(())
}

async fn cmd_sites(storage: &Path) -> Result<(), String> {
    let host = DumpHost::open(storage, "")?;
    let sites = sites::list_sites(&host).await.map_err(|e| e.to_string())?;

    if sites.is_empty() {
        println!("No sites configured");
    }
    for site in sites {
        println!("{:<40} {} profiles", site.hostname, site.profile_count);
    }
    Ok(())
}

async fn cmd_exceptions(storage: &Path) -> Result<(), String> {
    let host = DumpHost::open(storage, "")?;
    let hosts = sites::list_exceptions(&host).await.map_err(|e| e.to_string())?;

    if hosts.is_empty() {
        println!("No exceptions");
    }
    for hostname in hosts {
        println!("{hostname}");
    }
    Ok(())
}

async fn cmd_forget(storage: &Path, hostname: &str) -> Result<(), String> {
    let host = DumpHost::open(storage, "")?;
    sites::clear_exception(&host, hostname).await.map_err(|e| e.to_string())?;
    host.save()?;
    println!("{hostname}: chooser re-enabled");
    Ok(())
}
