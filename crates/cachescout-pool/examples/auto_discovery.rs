//! Connects to a cluster configuration endpoint, starts the
//! auto-discovering server pool, and routes a few keys.
//!
//! ```bash
//! cargo run --example auto_discovery -- demo.cfg.cache.example:11211
//! ```

use cachescout_common::ClusterSettings;
use cachescout_pool::{AutoServerPool, CacheNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo.cfg.cache.example:11211".to_string());
    let (hostname, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected <hostname>:<port>, got '{}'", endpoint))?;

    let settings = ClusterSettings::new(hostname, port.parse()?)?;
    let pool = AutoServerPool::new(settings);

    println!("Starting pool against {}", endpoint);
    pool.start().await?;

    for node in pool.working_nodes().await {
        println!("discovered node: {}", node.endpoint());
    }

    for key in ["user:1", "user:2", "session:abc", "feed:42"] {
        match pool.locate(key) {
            Some(node) => println!("{} -> {}", key, node.endpoint()),
            None => println!("{} -> no alive node", key),
        }
    }

    pool.dispose().await;
    Ok(())
}
