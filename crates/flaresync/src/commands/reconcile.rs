use colored::Colorize;
use flaresync_cloud::acquire_lock;
use std::path::Path;

pub async fn handle(project_root: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let registry = super::load_registry(project_root, config)?;
    let lock = acquire_lock(project_root).await?;

    println!("{}", "リコンサイル中...".blue());
    let result = registry.reconcile_all().await;
    lock.release().await?;
    let summary = result?;

    println!();
    println!(
        "{} 作成 {} / 更新 {} / 削除 {} / 変更なし {} ({}ms)",
        "結果:".bold(),
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red(),
        summary.no_change,
        summary.duration_ms
    );

    if summary.is_success() {
        println!("{}", "✓ すべてのリソースが同期されています".green());
        return Ok(());
    }

    println!();
    println!("{}", format!("✗ {} 件失敗", summary.failed.len()).red().bold());
    for (name, message) in &summary.failed {
        println!("  {} {}", name.cyan(), message.dimmed());
    }
    anyhow::bail!("{} 件のリソースを同期できませんでした", summary.failed.len())
}
