use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::app::AppDescriptor;
use crate::error::ConfigError;
use crate::restart::RestartPolicy;

/// メインの設定構造体
///
/// `apps` が監視対象の宣言リスト。`supervisor` と `logging` は
/// マニフェスト形式には無い運用側の設定で、省略時はデフォルトが効く。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// スーパーバイザ設定
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// ログ設定
    #[serde(default)]
    pub logging: LoggingSettings,

    /// アプリ記述子のリスト
    #[serde(default)]
    pub apps: Vec<AppDescriptor>,
}

/// スーパーバイザ関連の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// デフォルトの再起動ポリシー（アプリ個別指定が無い場合に適用）
    #[serde(default)]
    pub restart: RestartPolicy,

    /// シャットダウン時に SIGTERM から SIGKILL までに待つ時間（ミリ秒）
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            restart: RestartPolicy::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// ログ関連の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// 詳細ログを有効にするか
    #[serde(default)]
    pub verbose: bool,

    /// ログレベル ("error" / "warn" / "info" / "debug" / "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// スーパーバイザ自身のログファイル
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            level: default_log_level(),
            log_file: None,
        }
    }
}

// デフォルト値関数
fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 検証済みアプリと除外されたアプリの読み込み結果
///
/// 記述子単体の欠陥は当該アプリの登録だけを落とし、他のアプリの
/// 読み込みは続行する。名前の重複だけは設定全体の矛盾なので即エラー。
#[derive(Debug)]
pub struct LoadReport {
    pub apps: Vec<AppDescriptor>,
    pub rejected: Vec<(String, ConfigError)>,
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// 拡張子が .json なら PM2 形式の `{"apps": [...]}` として、
    /// それ以外は TOML として解釈する。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    }

    /// 設定ファイルに保存（TOML）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        use anyhow::Context;

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        // ディレクトリが存在しない場合は作成
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// アプリ記述子の検証
    ///
    /// 名前重複は ValidationError として読み込み全体を失敗させる。
    /// 記述子単体の欠陥は rejected に隔離し、残りを返す。
    pub fn load_apps(&self) -> Result<LoadReport, ConfigError> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            if !app.name.trim().is_empty() && !seen.insert(app.name.as_str()) {
                return Err(ConfigError::validation(
                    &app.name,
                    "duplicate app name in configuration",
                ));
            }
        }

        let mut apps = Vec::new();
        let mut rejected = Vec::new();

        for app in &self.apps {
            match app.validate() {
                Ok(()) => apps.push(app.clone()),
                Err(e) => rejected.push((app.name.clone(), e)),
            }
        }

        Ok(LoadReport { apps, rejected })
    }

    /// デフォルトの設定ファイルパスを取得
    pub fn default_config_path() -> anyhow::Result<PathBuf> {
        use anyhow::Context;

        let home_dir = home::home_dir().context("Failed to get home directory")?;

        Ok(home_dir.join(".procwatch").join("config.toml"))
    }

    /// 設定ファイルパスの候補を取得（優先順位順）
    pub fn config_path_candidates() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. カレントディレクトリの .procwatch/config.toml
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join(".procwatch").join("config.toml"));
        }

        // 2. ホームディレクトリの .procwatch/config.toml
        if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".procwatch").join("config.toml"));
        }

        // 3. XDG規格に従った設定ディレクトリ（Linux/Unix）
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg_config_home)
                    .join("procwatch")
                    .join("config.toml"),
            );
        } else if let Some(home_dir) = home::home_dir() {
            paths.push(
                home_dir
                    .join(".config")
                    .join("procwatch")
                    .join("config.toml"),
            );
        }

        paths
    }

    /// 設定ファイルを自動検出して読み込み
    pub fn load_auto() -> Result<Option<(Self, PathBuf)>, ConfigError> {
        for path in Self::config_path_candidates() {
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }
        Ok(None)
    }

    /// 環境変数で設定を上書き
    pub fn apply_env_overrides(&mut self) {
        if let Ok(verbose) = std::env::var("PROCWATCH_VERBOSE") {
            self.logging.verbose = verbose == "1" || verbose.to_lowercase() == "true";
        }

        if let Ok(log_file) = std::env::var("PROCWATCH_LOG_FILE") {
            self.logging.log_file = Some(PathBuf::from(log_file));
        }
    }

    /// 設定のサンプルを生成
    pub fn sample() -> Self {
        let mut config = Self::default();

        let mut app = AppDescriptor::new("web", "/srv/app/venv/bin/gunicorn");
        app.args = vec![
            "main:app".to_string(),
            "--bind".to_string(),
            "127.0.0.1:6000".to_string(),
            "--workers".to_string(),
            "1".to_string(),
        ];
        app.env
            .insert("FLASK_ENV".to_string(), "production".to_string());
        config.apps.push(app);

        config.logging.log_file = Some(PathBuf::from("~/.procwatch/procwatch.log"));

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::InterpreterMode;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.apps.is_empty());
        assert!(!config.logging.verbose);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.supervisor.shutdown_grace_ms, 5_000);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::sample();
        let toml_str = toml::to_string_pretty(&config).unwrap();

        assert!(toml_str.contains("[supervisor]"));
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("[[apps]]"));
    }

    #[test]
    fn test_single_descriptor_manifest() {
        let toml_content = r#"
[[apps]]
name = "peterspte_ai"
script = "/nvme/Peterspte_AI/venv/bin/gunicorn"
args = "main:app --bind 127.0.0.1:6000 --workers 1"
interpreter = "none"

[apps.env]
FLASK_ENV = "production"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        let report = config.load_apps().unwrap();

        assert_eq!(report.apps.len(), 1);
        assert!(report.rejected.is_empty());

        let app = &report.apps[0];
        assert_eq!(app.name, "peterspte_ai");
        assert_eq!(
            app.script,
            PathBuf::from("/nvme/Peterspte_AI/venv/bin/gunicorn")
        );
        assert_eq!(
            app.args,
            vec!["main:app", "--bind", "127.0.0.1:6000", "--workers", "1"]
        );
        assert_eq!(app.interpreter, InterpreterMode::None);
        assert_eq!(app.env.get("FLASK_ENV").map(String::as_str), Some("production"));
    }

    #[test]
    fn test_json_manifest() {
        let json_content = r#"
{
  "apps": [
    {
      "name": "peterspte_ai",
      "script": "/nvme/Peterspte_AI/venv/bin/gunicorn",
      "args": "main:app --bind 127.0.0.1:6000 --workers 1",
      "interpreter": "none",
      "env": { "FLASK_ENV": "production" }
    }
  ]
}
"#;

        let temp_dir = tempfile::tempdir().unwrap();
        let json_path = temp_dir.path().join("ecosystem.json");
        std::fs::write(&json_path, json_content).unwrap();

        let config = Config::from_file(&json_path).unwrap();
        let report = config.load_apps().unwrap();

        assert_eq!(report.apps.len(), 1);
        assert_eq!(report.apps[0].name, "peterspte_ai");
        assert_eq!(
            report.apps[0].env.get("FLASK_ENV").map(String::as_str),
            Some("production")
        );
    }

    #[test]
    fn test_duplicate_names_fail_validation() {
        let toml_content = r#"
[[apps]]
name = "web"
script = "/usr/bin/true"

[[apps]]
name = "web"
script = "/usr/bin/false"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        let err = config.load_apps().unwrap_err();

        match err {
            ConfigError::Validation { name, .. } => assert_eq!(name, "web"),
            other => panic!("expected validation error, got: {other}"),
        }
    }

    #[test]
    fn test_defective_descriptor_is_isolated() {
        let toml_content = r#"
[[apps]]
name = "good"
script = "/usr/bin/true"

[[apps]]
name = "broken"
script = ""
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        let report = config.load_apps().unwrap();

        assert_eq!(report.apps.len(), 1);
        assert_eq!(report.apps[0].name, "good");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "broken");
    }

    #[test]
    fn test_parse_error_on_malformed_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "this is [not valid toml").unwrap();

        match Config::from_file(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got: {other:?}"),
        }
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        // 設定ファイルを作成
        let config = Config::sample();
        config.save_to_file(&config_path).unwrap();

        // 設定ファイルから読み込み
        let loaded = Config::from_file(&config_path).unwrap();

        assert_eq!(loaded.apps.len(), config.apps.len());
        assert_eq!(loaded.apps[0].name, config.apps[0].name);
        assert_eq!(loaded.apps[0].args, config.apps[0].args);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();

        std::env::set_var("PROCWATCH_VERBOSE", "true");
        std::env::set_var("PROCWATCH_LOG_FILE", "/tmp/procwatch-test.log");

        config.apply_env_overrides();

        assert!(config.logging.verbose);
        assert_eq!(
            config.logging.log_file,
            Some(PathBuf::from("/tmp/procwatch-test.log"))
        );

        std::env::remove_var("PROCWATCH_VERBOSE");
        std::env::remove_var("PROCWATCH_LOG_FILE");
    }
}
