use colored::Colorize;
use flaresync_cloud::acquire_lock;
use std::path::Path;
use tokio::sync::watch;

pub async fn handle(project_root: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let registry = super::load_registry(project_root, config)?;
    let lock = acquire_lock(project_root).await?;

    println!(
        "{} {}",
        "コントローラーを起動しました:".green(),
        registry.kinds().join(", ").cyan()
    );
    println!("{}", "Ctrl-C で停止します".dimmed());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::error!(error = %e, "Cannot listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    registry.run(shutdown_rx).await;
    signal.abort();
    lock.release().await?;

    println!("{}", "コントローラーを停止しました".yellow());
    Ok(())
}
