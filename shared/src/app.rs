use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::restart::RestartPolicy;

/// インタプリタモード
///
/// "none" はスクリプトを実行ファイルとして直接起動する。
/// それ以外の文字列はインタプリタバイナリのパスとして扱い、
/// スクリプトパスを第一引数に前置して起動する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InterpreterMode {
    None,
    Interpreter(PathBuf),
}

impl Default for InterpreterMode {
    fn default() -> Self {
        InterpreterMode::None
    }
}

impl From<String> for InterpreterMode {
    fn from(s: String) -> Self {
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            InterpreterMode::None
        } else {
            InterpreterMode::Interpreter(PathBuf::from(s))
        }
    }
}

impl From<InterpreterMode> for String {
    fn from(mode: InterpreterMode) -> Self {
        match mode {
            InterpreterMode::None => "none".to_string(),
            InterpreterMode::Interpreter(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// 1 アプリの起動方法を宣言する記述子
///
/// 設定読み込み時に生成され、その後は不変。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// アプリ名（設定内で一意）
    pub name: String,

    /// エントリポイントのパス
    pub script: PathBuf,

    /// 起動引数（空白区切り文字列またはリストを受け付ける）
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Vec<String>,

    /// インタプリタモード
    #[serde(default)]
    pub interpreter: InterpreterMode,

    /// 環境変数オーバーレイ（継承環境にマージ、衝突時はこちらが優先）
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// 作業ディレクトリ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// アプリ個別の再起動ポリシー（未指定ならスーパーバイザのデフォルト）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartPolicy>,

    /// キャプチャした出力の保存先
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl AppDescriptor {
    pub fn new(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            args: Vec::new(),
            interpreter: InterpreterMode::None,
            env: HashMap::new(),
            cwd: None,
            restart: None,
            log_file: None,
        }
    }

    /// 記述子単体の検証（名前の一意性は設定全体の検証で行う）
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("<unnamed>", "app name is empty"));
        }

        if self.script.as_os_str().is_empty() {
            return Err(ConfigError::validation(&self.name, "script path is empty"));
        }

        Ok(())
    }
}

/// args フィールドのデシリアライズ
///
/// PM2 形式の空白区切り文字列と TOML のリスト表記の両方を受け付ける。
fn deserialize_args<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ArgsField {
        Line(String),
        List(Vec<String>),
    }

    match ArgsField::deserialize(deserializer)? {
        ArgsField::Line(line) => Ok(line.split_whitespace().map(str::to_string).collect()),
        ArgsField::List(list) => Ok(list),
    }
}
