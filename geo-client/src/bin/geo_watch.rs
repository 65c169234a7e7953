//! # Live Fence Watcher
//!
//! Purpose: Follow a live geofence feed from the command line and print one
//! line per event.
//!
//! ```text
//! geo-watch 127.0.0.1:9851 NEARBY fleet FENCE POINT 33.46 -112.26 6000
//! ```
//!
//! Set `RUST_LOG=debug` to see connection and handshake events.

use std::env;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use geo_client::{ClientConfig, GeoClient};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(addr) = args.next() else {
        bail!("usage: geo-watch <addr> <COMMAND> [args...]");
    };
    let command: Vec<String> = args.collect();
    let Some((name, rest)) = command.split_first() else {
        bail!("missing fence command, e.g. NEARBY fleet FENCE POINT 33 -115 5000");
    };
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    // The feed uses its own connection; the pool only needs the handshake.
    let config = ClientConfig {
        addr: addr.clone(),
        max_idle: 1,
        max_total: 1,
        ..ClientConfig::default()
    };
    let client =
        GeoClient::with_config(config).with_context(|| format!("connecting to {addr}"))?;
    let feed = client
        .live(name, &rest)
        .with_context(|| format!("starting {name} feed"))?;
    info!(addr = %addr, command = %name, "watching live feed");

    for event in feed {
        let event = event.context("reading live feed")?;
        let when = event
            .time
            .map(|time| time.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{when} {} {} {}/{} {}",
            event.command, event.detect, event.key, event.id, event.object
        );
    }

    info!("feed closed by server");
    Ok(())
}
