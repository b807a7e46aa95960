//! Quill server binary.
//!
//! Runs one node of a Quill cluster. The node speaks the JSON-lines message
//! protocol on stdin/stdout and coordinates offsets through the `lin-kv`
//! service, so it is started by a test harness rather than by hand:
//!
//! ```bash
//! maelstrom test -w kafka --bin target/release/quill-server \
//!     --node-count 2 --concurrency 2n --time-limit 20 --rate 1000
//! ```
//!
//! Logs go to stderr; stdout carries protocol traffic only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use quill_core::NodeId;
use quill_log::RetryPolicy;
use quill_runtime::{LinKvStore, Node, NodeHandle, RuntimeConfig, Transport};
use quill_server::{LogService, ServiceConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Quill commit-log node.
#[derive(Parser, Debug)]
#[command(name = "quill-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Deadline for each peer's answer during poll reconciliation.
    #[arg(long, default_value = "500")]
    peer_timeout_ms: u64,

    /// Deadline for coordination store RPCs.
    #[arg(long, default_value = "1000")]
    rpc_timeout_ms: u64,

    /// Give up a contended compare-and-swap after this many attempts.
    /// Retries until success if not specified.
    #[arg(long)]
    max_cas_attempts: Option<u32>,

    /// Base backoff between compare-and-swap attempts (0 disables backoff).
    #[arg(long, default_value = "0")]
    cas_backoff_ms: u64,

    /// Node id of the linearizable key-value service.
    #[arg(long, default_value = quill_runtime::DEFAULT_COORD_SERVICE)]
    coord_service: String,
}

impl Args {
    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::new()
            .with_rpc_timeout(Duration::from_millis(self.rpc_timeout_ms))
            .with_coord_service(NodeId::new(self.coord_service.as_str()))
    }

    fn service_config(&self) -> ServiceConfig {
        let retry = RetryPolicy {
            max_attempts: self.max_cas_attempts,
            ..RetryPolicy::unbounded()
        };
        let base = Duration::from_millis(self.cas_backoff_ms);
        let retry = retry.with_backoff(base, base.saturating_mul(32));
        ServiceConfig::new()
            .with_peer_timeout(Duration::from_millis(self.peer_timeout_ms))
            .with_retry(retry)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Stdout carries protocol messages; logs must go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime_config = args.runtime_config();
    runtime_config.validate()?;
    let service_config = args.service_config();
    service_config.validate()?;

    info!(
        coord_service = %runtime_config.coord_service,
        rpc_timeout_ms = args.rpc_timeout_ms,
        peer_timeout_ms = args.peer_timeout_ms,
        max_cas_attempts = ?args.max_cas_attempts,
        "Starting Quill node"
    );

    let result = Node::new(runtime_config)
        .run(move |handle: NodeHandle| {
            let config = handle.config();
            let coord = LinKvStore::new(
                handle.clone(),
                config.coord_service.clone(),
                config.rpc_timeout,
            );
            info!(
                node_id = %handle.node_id(),
                coord_service = %coord.service(),
                "Coordination store ready"
            );
            LogService::new(Arc::new(coord), handle, service_config)
        })
        .await;

    if let Err(e) = result {
        error!(error = %e, "Node stopped");
        return Err(e.into());
    }
    info!("Node stopped");
    Ok(())
}
