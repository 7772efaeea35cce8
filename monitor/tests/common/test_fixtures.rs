// テストフィクスチャとダミーデータ生成
// 各統合テストファイルが独立コンパイルされるため dead_code 警告を抑制。

#![allow(dead_code)]

use procwatch_shared::{AppDescriptor, InterpreterMode, RestartMode, RestartPolicy, SupervisorSettings};

/// 一意なテストアプリ名を生成
pub fn unique_app_name(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// シェルコマンド 1 行を実行する記述子を生成
pub fn shell_app(name: &str, command: &str) -> AppDescriptor {
    let mut app = AppDescriptor::new(name, "/bin/sh");
    app.args = vec!["-c".to_string(), command.to_string()];
    app.interpreter = InterpreterMode::None;
    app
}

/// テスト向けの高速な再起動ポリシー
///
/// min_uptime を大きく取り、カウンタがリセットされないようにしてある。
pub fn fast_policy(mode: RestartMode, max_restarts: u32) -> RestartPolicy {
    RestartPolicy {
        mode,
        max_restarts,
        backoff_ms: 10,
        max_backoff_ms: 50,
        min_uptime_ms: 60_000,
    }
}

/// テスト用のスーパーバイザ設定
pub fn test_settings(policy: RestartPolicy) -> SupervisorSettings {
    SupervisorSettings {
        restart: policy,
        shutdown_grace_ms: 1_000,
    }
}
