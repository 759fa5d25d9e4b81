use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use flaresync_cloud::{Condition, ConditionStatus};
use flaresync_cloudflare::StatusRow;
use std::path::Path;

pub async fn handle(project_root: &Path) -> anyhow::Result<()> {
    let rows = flaresync_cloudflare::status(project_root).await?;

    if rows.is_empty() {
        println!("{}", "登録されたリソースはありません".dimmed());
        println!("{} でマニフェストを登録してください", "flaresync apply -f".cyan());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<16} {:<20} {:<34} {:<8} {:<8} {:<10}",
            "KIND", "NAME", "EXTERNAL NAME", "READY", "SYNCED", "AGE"
        )
        .bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    let now = Utc::now();
    for row in &rows {
        println!(
            "{:<16} {:<20} {:<34} {:<8} {:<8} {:<10}",
            row.kind,
            row.name.cyan(),
            row.external_name.as_deref().unwrap_or("-"),
            condition_cell(row.ready.as_ref()),
            condition_cell(row.synced.as_ref()),
            last_change(row, now).dimmed()
        );
        if let Some(note) = note(row) {
            println!("  {}", note.yellow());
        }
    }

    Ok(())
}

fn condition_cell(condition: Option<&Condition>) -> ColoredString {
    match condition.map(|c| c.status) {
        Some(ConditionStatus::True) => "True".green(),
        Some(ConditionStatus::False) => "False".red(),
        Some(ConditionStatus::Unknown) | None => "Unknown".dimmed(),
    }
}

/// 直近の状態変化からの経過時間
fn last_change(row: &StatusRow, now: DateTime<Utc>) -> String {
    [row.ready.as_ref(), row.synced.as_ref()]
        .into_iter()
        .flatten()
        .map(|c| c.last_transition_time)
        .max()
        .map(|t| format_age(now.signed_duration_since(t)))
        .unwrap_or_else(|| "-".to_string())
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86400),
    }
}

/// 補足情報 (削除待ち・未反映の世代・失敗理由)
fn note(row: &StatusRow) -> Option<String> {
    if row.deleting {
        return Some("削除待ち".to_string());
    }
    if let Some(synced) = &row.synced {
        if synced.status == ConditionStatus::False {
            return Some(format!(
                "{}: {}",
                synced.reason,
                synced.message.as_deref().unwrap_or("")
            ));
        }
    }
    if row.observed_generation != Some(row.generation) {
        return Some(format!(
            "世代 {} は未反映 (反映済み: {})",
            row.generation,
            row.observed_generation
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    None
}
