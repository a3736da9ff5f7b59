//! Request and close command implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use nsmove_chain::{Chain, ChainBuilder, NetworkService, RelocationElement, RequestContext};
use nsmove_core::{Connection, ConnectionId, KernelMechanism};
use nsmove_netns::{LinuxNetNs, NetNsWorker, RelocationConfig};

use crate::cli::RelocateArgs;

pub async fn request(config: &RelocationConfig, args: &RelocateArgs) -> Result<()> {
    let conn = connection(config, args)?;
    require_root("request")?;

    info!(connection = %conn.id, interface = %args.interface, netns = %args.netns, "🔗 Moving interface into connection namespace");

    let (chain, worker) = build_chain(config)?;
    let result = chain
        .request(&context(args), conn)
        .await
        .with_context(|| format!("Request for connection {} failed", args.id));

    drop(chain);
    shutdown(worker).await;

    let conn = result?;
    println!("✅ Moved {} into {}", args.interface, args.netns);
    println!("{}", serde_json::to_string_pretty(&conn)?);
    Ok(())
}

pub async fn close(config: &RelocationConfig, args: &RelocateArgs) -> Result<()> {
    let conn = connection(config, args)?;
    require_root("close")?;

    info!(connection = %conn.id, interface = %args.interface, netns = %args.netns, "🧹 Moving interface back to home namespace");

    let (chain, worker) = build_chain(config)?;
    let result = chain
        .close(&context(args), conn)
        .await
        .with_context(|| format!("Close for connection {} failed", args.id));

    drop(chain);
    shutdown(worker).await;

    result?;
    println!("✅ Moved {} back from {}", args.interface, args.netns);
    Ok(())
}

/// Build and validate the connection before touching the kernel
fn connection(config: &RelocationConfig, args: &RelocateArgs) -> Result<Connection> {
    let id = ConnectionId::new(&args.id).context("Invalid connection ID")?;
    let conn = Connection::new(id).with_mechanism(
        KernelMechanism::new()
            .with_netns_url(&args.netns)
            .with_interface_name(&args.interface),
    );

    conn.interface_name().context("Invalid interface name")?;
    conn.netns_ref(&config.netns_dir)
        .context("Invalid network namespace reference")?;
    Ok(conn)
}

fn context(args: &RelocateArgs) -> RequestContext {
    if args.client {
        RequestContext::client()
    } else {
        RequestContext::server()
    }
}

fn require_root(command: &str) -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root. Try: sudo nsmove {command} ...");
    }
    Ok(())
}

fn build_chain(config: &RelocationConfig) -> Result<(Chain, Arc<NetNsWorker>)> {
    let worker = NetNsWorker::spawn(Arc::new(LinuxNetNs::new()), config)
        .context("Failed to start namespace worker")?;
    let worker = Arc::new(worker);

    let element_worker = Arc::clone(&worker);
    let element_config = config.clone();
    let chain = ChainBuilder::new()
        .with(move |next| RelocationElement::new(element_worker, &element_config, next))
        .build();

    Ok((chain, worker))
}

async fn shutdown(worker: Arc<NetNsWorker>) {
    match Arc::try_unwrap(worker) {
        Ok(worker) => {
            if let Err(e) = worker.shutdown().await {
                warn!(error = %e, "Namespace worker did not stop cleanly");
            }
        }
        Err(_) => debug!("Namespace worker still in use, leaving it to process exit"),
    }
}
