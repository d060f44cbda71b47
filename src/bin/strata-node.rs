//! Strata node.
//!
//! Hosts a tenant registry and the configuration follower endpoints over an
//! in-memory versioned store, and follows its own endpoints with a consumer
//! feeding a tenant cache and a knob cache. Intended for local smoke runs.
//!
//! # Usage
//!
//! ```bash
//! strata-node --config strata.toml --tenant alpha --tenant beta:group-a
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use strata::StrataConfig;
use strata::follower::ConfigConsumer;
use strata::follower::ConfigFollowerInterface;
use strata::follower::ConfigFollowerService;
use strata::follower::KnobCache;
use strata::follower::KnobKey;
use strata::follower::KnobValue;
use strata::follower::LocalTransport;
use strata::follower::knobs::set_knob;
use strata::kv::MemoryVersionedStore;
use strata::kv::Transaction;
use strata::tenant::TenantCache;
use strata::tenant::TenantManager;
use strata::tenant::name::printable;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strata-node")]
struct Args {
    /// Path to TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the address the follower endpoints are served at.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Register a tenant at startup, as `name` or `name:group`. Repeatable.
    #[arg(long = "tenant")]
    tenants: Vec<String>,

    /// Set a knob at startup, as `[class/]name=value`. Repeatable.
    #[arg(long = "knob")]
    knobs: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

/// Parse `[class/]name=value`. Integers and booleans are typed, anything else
/// is a string.
fn parse_knob(spec: &str) -> Result<(KnobKey, KnobValue)> {
    let (path, raw) = spec.split_once('=').context("knob must be [class/]name=value")?;
    let key = match path.split_once('/') {
        Some((class, name)) => KnobKey::scoped(class, name),
        None => KnobKey::global(path),
    };
    let value = if let Ok(i) = raw.parse::<i64>() {
        KnobValue::Int(i)
    } else if let Ok(b) = raw.parse::<bool>() {
        KnobValue::Bool(b)
    } else {
        KnobValue::String(raw.to_string())
    };
    Ok((key, value))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = StrataConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen_addr) = args.listen_addr {
        config.node.listen_addr = listen_addr;
    }
    config.validate()?;

    let store = MemoryVersionedStore::new();
    let layout = config.registry_layout()?;
    let tenant_subspace = config.tenant_subspace()?;

    let transport = LocalTransport::new(config.node.listen_addr.clone());
    let service = Arc::new(ConfigFollowerService::new(store.clone(), config.service_config()));
    let mut served = ConfigFollowerInterface::new();
    served.setup_well_known_endpoints();
    served.register(&*transport, service).await?;
    info!(listen_addr = %config.node.listen_addr, interface = %served.id(), "follower endpoints registered");

    let manager = TenantManager::with_tenant_subspace(store.clone(), layout.clone(), tenant_subspace.clone());
    for spec in &args.tenants {
        let (name, group) = match spec.split_once(':') {
            Some((name, group)) => (name, Some(group.as_bytes())),
            None => (spec.as_str(), None),
        };
        let entry = manager.create_tenant(name.as_bytes(), group).await?;
        manager.mark_ready(name.as_bytes()).await?;
        info!(tenant = %name, id = %entry.id, "tenant ready");
    }

    if !args.knobs.is_empty() {
        let mut tx = Transaction::begin(&*store).await?;
        for spec in &args.knobs {
            let (key, value) = parse_knob(spec)?;
            set_knob(&mut tx, &key, &value)?;
        }
        let version = tx.commit().await?;
        info!(knobs = args.knobs.len(), version, "knobs written");
    }

    let tenant_cache = Arc::new(TenantCache::new(layout, tenant_subspace));
    let knob_cache = Arc::new(KnobCache::new());
    let followed = ConfigFollowerInterface::with_remote(config.node.listen_addr.clone());
    let mut consumer = ConfigConsumer::new(followed, transport, config.consumer_config());
    consumer.add_sink(tenant_cache.clone());
    consumer.add_sink(knob_cache.clone());

    let shutdown = CancellationToken::new();
    let consumer_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { consumer.run(shutdown).await }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();
    if let Err(e) = consumer_task.await {
        warn!(error = %e, "consumer task failed");
    }

    let version = tenant_cache.latest_version().await;
    for (name, entry) in tenant_cache.tenants_at(version).await? {
        info!(tenant = %printable(&name), id = %entry.id, state = %entry.tenant_state, version, "cached tenant");
    }
    for (key, value) in knob_cache.all().await {
        info!(knob = %key.name, class = ?key.config_class.as_deref().map(printable), ?value, "cached knob");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_knob() {
        let (key, value) = parse_knob("storage/cache_mb=64").unwrap();
        assert_eq!(key, KnobKey::scoped("storage", "cache_mb"));
        assert_eq!(value, KnobValue::Int(64));

        let (key, value) = parse_knob("verbose=true").unwrap();
        assert_eq!(key, KnobKey::global("verbose"));
        assert_eq!(value, KnobValue::Bool(true));

        assert!(parse_knob("no-equals").is_err());
    }
}
