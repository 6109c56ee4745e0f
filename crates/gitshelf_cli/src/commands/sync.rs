//! Sync command implementation.

use gitshelf_server::{ServerBuilder, ServerConfig};
use gitshelf_sync::ReplicaConfig;
use std::path::Path;
use tracing::info;

/// Runs the sync command.
///
/// Clones `remote` into `dir` if needed, pulls, and runs one sync cycle
/// committing and pushing anything pending under `root`.
pub async fn run(
    dir: &Path,
    root: &str,
    remote: &str,
    branch: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Syncing {:?} with {} ({})", dir, remote, branch);
    println!("Syncing {:?} with {} ({})", dir, remote, branch);
    println!();

    let replica = ReplicaConfig::new(remote, branch, dir).with_tracked_path(root);
    let server = ServerBuilder::new(ServerConfig::new(replica)).build().await?;
    let report = server.sync().await?;

    println!("Committed:  {}", if report.committed { "yes" } else { "no" });
    println!("Duration:   {:?}", report.duration);

    let stats = server.replica().stats();
    println!("Conflicts:  {}", stats.conflicts_resolved);
    for conflict in &report.conflicts {
        println!("  {}", conflict);
    }

    println!();
    if report.had_conflict() {
        println!("✗ Local edits discarded in favor of the remote");
    } else {
        println!("✓ Working copy in sync");
    }

    Ok(())
}
