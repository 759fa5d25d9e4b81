use colored::Colorize;
use std::path::Path;

pub async fn handle(project_root: &Path, kind: &str, name: &str) -> anyhow::Result<()> {
    if !flaresync_cloudflare::request_deletion(project_root, kind, name).await? {
        anyhow::bail!("リソース '{}/{}' が見つかりません", kind, name);
    }

    println!(
        "{} {}/{} に削除マークを付けました",
        "✓".green(),
        kind,
        name.cyan()
    );
    println!("{}", "次のリコンサイルで削除されます".dimmed());
    Ok(())
}
