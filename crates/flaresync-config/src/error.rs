use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: flaresync.yaml, .flaresync/config.yaml\n\
        - ~/.config/flaresync/config.yaml\n\
        または FLARESYNC_CONFIG 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("プロファイル '{0}' が定義されていません")]
    UnknownProfile(String),

    #[error(
        "プロファイル '{0}' の API トークンがありません。\
        apiToken / apiTokenEnv を設定するか CLOUDFLARE_API_TOKEN を指定してください"
    )]
    MissingApiToken(String),

    #[error("設定ファイルの解析に失敗しました ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("設定値が不正です ({path}): {message}")]
    Invalid { path: String, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
