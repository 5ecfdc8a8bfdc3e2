//! Watch one configuration entry and print every change.
//!
//! This example shows how to:
//! - Load client settings from a file and `NACOS_*` environment variables
//! - Publish an initial value
//! - Watch the entry until Ctrl-C, then stop the watch
//!
//! Run with:
//! NACOS_SERVER_ADDR=http://127.0.0.1:8848 NACOS_USERNAME=nacos NACOS_PASSWORD=nacos \
//!     cargo run --example watch_config

use nacos_watch::prelude::*;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nacos_watch=debug")),
        )
        .init();

    println!("=== Config Watch Example ===\n");

    let file = Path::new("nacos.yaml");
    let settings = ClientSettings::load(file.exists().then_some(file), "NACOS")?;
    let client = NacosClientBuilder::from_settings(&settings)?.build()?;
    println!("Client: {:?}\n", client);

    let key = ConfigKey::new("pay-dev", "DEFAULT_GROUP", "test");
    client.publish(&key, "timeout: 30").await?;
    println!("Published initial value for {}", key);

    let handle = client
        .watch(key.clone(), |content| {
            println!("[watch] new content:\n{}\n", content);
        })
        .await?;
    println!(
        "Watching {} (fingerprint {}). Press Ctrl-C to stop.\n",
        handle.key(),
        handle.fingerprint()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl-C: {}", e);
    }

    println!("Latest content: {}", handle.snapshot().content);
    handle.stop().await?;
    println!("Watch stopped.");

    Ok(())
}
