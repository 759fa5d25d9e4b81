use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};

pub async fn handle(project_root: &Path, files: &[PathBuf]) -> anyhow::Result<()> {
    let mut total = 0;
    for file in files {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("マニフェストを読み込めません: {}", file.display()))?;

        let applied =
            flaresync_cloudflare::apply_manifests(project_root, &content, &file.display().to_string())
                .await?;
        for resource in &applied {
            println!("{} {}/{}", "✓".green(), resource.kind, resource.name.cyan());
        }
        total += applied.len();
    }

    println!();
    println!(
        "{} 件のリソースを登録しました ({} で同期)",
        total,
        "flaresync reconcile".cyan()
    );
    Ok(())
}
