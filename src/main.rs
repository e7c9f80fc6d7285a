//! Watcher demo: configure an endpoint pool, crawl the marketplace, and
//! log cache events until interrupted.
//!
//! Usage: `nifty-stakes [rpc-url]` — with no argument the built-in default
//! endpoint set is used.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use nifty_stakes::{
    ClientConfig, Cluster, ClusterEvent, EndpointDescriptor, EndpointPool, ProgramConfig,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = Arc::new(ClientConfig::default());
    let program = Arc::new(ProgramConfig::mainnet());

    let pool = EndpointPool::solana(config.clone());
    let targets = std::env::args()
        .nth(1)
        .map(|url| vec![EndpointDescriptor::new(url)]);
    pool.configure(targets).await?;

    let (event_sender, mut events) = mpsc::unbounded_channel();
    let cluster = Cluster::new(pool.clone(), program, config, Some(event_sender));
    let tasks = cluster.start();

    info!("watching the marketplace; ctrl-c to stop");
    loop {
        tokio::select! {
            Some(event) = events.recv() => report(&cluster, event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
    cluster.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn report(cluster: &Cluster, event: ClusterEvent) {
    match event {
        ClusterEvent::NewEntry(entry) => {
            let entry = entry.read().unwrap();
            info!(
                entry = %entry.pubkey,
                group = entry.group_number,
                block = entry.block_number,
                index = entry.entry_index,
                level = entry.level,
                "new entry"
            );
        }
        ClusterEvent::EntryChanged(entry) => {
            let entry = entry.read().unwrap();
            let state = cluster
                .clock()
                .read(None)
                .map(|clock| format!("{:?}", entry.state(&clock)))
                .unwrap_or_else(|| "clock not ready".to_string());
            info!(entry = %entry.pubkey, state, "entry changed");
        }
        ClusterEvent::EntriesUpdateComplete => {
            let when = cluster
                .clock()
                .read(None)
                .and_then(|clock| Utc.timestamp_opt(clock.unix_timestamp, 0).single())
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "unknown cluster time".to_string());
            info!(
                entries = cluster.entry_count(),
                cluster_time = %when,
                "crawl pass complete"
            );
        }
    }
}
