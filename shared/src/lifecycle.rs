use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 監視対象プロセスの状態
///
/// Stopped → Starting → Running → (Exited → Starting | Stopped)
/// 再起動上限に達した場合のみ Failed へ遷移する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Stopped,  // ⚪ 停止
    Starting, // 🟡 起動中
    Running,  // 🟢 実行中
    Exited,   // 🔵 終了（再起動判断待ち）
    Failed,   // 🔴 断念
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.icon(), self.label())
    }
}

impl ProcessState {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Stopped => "⚪",
            Self::Starting => "🟡",
            Self::Running => "🟢",
            Self::Exited => "🔵",
            Self::Failed => "🔴",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "停止",
            Self::Starting => "起動中",
            Self::Running => "実行中",
            Self::Exited => "終了",
            Self::Failed => "断念",
        }
    }

    /// 監視継続が必要な状態か（終端状態でないか）
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped | Self::Failed)
    }
}

/// プロセスの終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    /// 終了コード付きで終了
    Code(i32),
    /// シグナルで終了（Unix のみ）
    Signal(i32),
    /// 終了理由不明（spawn 失敗の再試行などで使用）
    Unknown,
}

impl ExitKind {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitKind::Code(0))
    }
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit code {code}"),
            ExitKind::Signal(sig) => write!(f, "signal {sig}"),
            ExitKind::Unknown => write!(f, "unknown exit"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitKind {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitKind::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitKind::Signal(sig);
            }
        }

        ExitKind::Unknown
    }
}

/// 出力ストリームの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// watcher → supervisor へのイベント
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessEvent {
    /// プロセス起動完了
    Started {
        name: String,
        pid: u32,
        timestamp: DateTime<Utc>,
    },
    /// プロセス終了
    Exited {
        name: String,
        exit: ExitKind,
        timestamp: DateTime<Utc>,
    },
    /// 起動失敗
    SpawnFailed {
        name: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// 出力キャプチャ（1 行単位）
    OutputLine {
        name: String,
        stream: OutputStream,
        line: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProcessEvent {
    pub fn app_name(&self) -> &str {
        match self {
            ProcessEvent::Started { name, .. }
            | ProcessEvent::Exited { name, .. }
            | ProcessEvent::SpawnFailed { name, .. }
            | ProcessEvent::OutputLine { name, .. } => name,
        }
    }
}

/// レジストリに保持する 1 アプリ分の追跡情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    pub last_exit: Option<ExitKind>,
}

impl ProcessRecord {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            state: ProcessState::Stopped,
            pid: None,
            restarts: 0,
            created_at: now,
            started_at: None,
            last_state_change: now,
            last_exit: None,
        }
    }
}

/// 実行 ID 生成（ログの突き合わせ用）
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("run-{timestamp:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ProcessState::Running.to_string(), "🟢 実行中");
        assert_eq!(ProcessState::Failed.icon(), "🔴");
    }

    #[test]
    fn test_state_activity() {
        assert!(ProcessState::Running.is_active());
        assert!(ProcessState::Starting.is_active());
        assert!(ProcessState::Exited.is_active());
        assert!(!ProcessState::Stopped.is_active());
        assert!(!ProcessState::Failed.is_active());
    }

    #[test]
    fn test_exit_kind_success() {
        assert!(ExitKind::Code(0).is_success());
        assert!(!ExitKind::Code(1).is_success());
        assert!(!ExitKind::Signal(15).is_success());
        assert!(!ExitKind::Unknown.is_success());
    }

    #[test]
    fn test_event_app_name() {
        let event = ProcessEvent::Exited {
            name: "web".to_string(),
            exit: ExitKind::Code(0),
            timestamp: Utc::now(),
        };
        assert_eq!(event.app_name(), "web");
    }

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
    }
}
