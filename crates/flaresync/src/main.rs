mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flaresync")]
#[command(about = "宣言した Cloudflare リソースを、リコンサイルで常に一致させる。", long_about = None)]
struct Cli {
    /// プロジェクトルート (.flaresync/state を置くディレクトリ)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// 設定ファイル (省略時は FLARESYNC_CONFIG → ./flaresync.yaml → ~/.config/flaresync)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ctrl-C まで全コントローラーを起動
    Run,
    /// 全リソースを1回だけリコンサイル
    Reconcile,
    /// マニフェストをストアに登録
    Apply {
        /// YAML マニフェスト (複数指定可)
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// リソースに削除マークを付ける (実際の削除は次のリコンサイル)
    Delete {
        /// 種別 (DnsRecord, R2Bucket, ...)
        kind: String,
        /// メタデータ名
        name: String,
    },
    /// リソースの状態を表示
    Status,
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = cli.project_root.as_path();
    match cli.command {
        Commands::Run => commands::run::handle(project_root, cli.config.as_deref()).await?,
        Commands::Reconcile => {
            commands::reconcile::handle(project_root, cli.config.as_deref()).await?
        }
        Commands::Apply { files } => commands::apply::handle(project_root, &files).await?,
        Commands::Delete { kind, name } => {
            commands::delete::handle(project_root, &kind, &name).await?
        }
        Commands::Status => commands::status::handle(project_root).await?,
        // Versionコマンドは設定ファイル不要
        Commands::Version => println!("flaresync {}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}
