use std::path::PathBuf;
use thiserror::Error;

/// 設定読み込み時のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 設定ファイルの読み取り失敗
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 設定ファイルの構文エラー
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// アプリ記述子の検証エラー（名前重複・必須フィールド欠落など）
    #[error("invalid app descriptor '{name}': {reason}")]
    Validation { name: String, reason: String },
}

impl ConfigError {
    pub fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// プロセス起動時のエラー
#[derive(Debug, Error)]
pub enum SpawnError {
    /// 実行ファイルが見つからない
    #[error("executable not found for app '{name}': {program}")]
    NotFound { name: String, program: PathBuf },

    /// exec 失敗などの OS エラー
    #[error("failed to spawn app '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
