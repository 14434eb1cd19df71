//! CLI command implementations.

pub mod agent;
pub mod impacted;
pub mod testwise;
pub mod watch;

pub use agent::AgentArgs;
pub use impacted::ImpactedArgs;
pub use testwise::TestwiseArgs;
pub use watch::WatchArgs;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Token cancelled on Ctrl-C
pub(crate) fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(err) => error!(error = %err, "Failed to listen for Ctrl-C, shutting down"),
        }
        trigger.cancel();
    });
    token
}
