// テストフィクスチャとダミーデータ生成
// 各統合テストファイルが独立コンパイルされるため dead_code 警告を抑制。

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use procwatch_shared::{AppDescriptor, InterpreterMode};

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

/// 環境変数オーバーレイ付きの記述子を生成
pub fn shell_app_with_env(
    name: &str,
    command: &str,
    env: HashMap<String, String>,
) -> AppDescriptor {
    let mut app = shell_app(name, command);
    app.env = env;
    app
}

/// インタプリタ経由で起動する記述子を生成（script はシェルスクリプト）
pub fn interpreted_app(name: &str, script: PathBuf) -> AppDescriptor {
    let mut app = AppDescriptor::new(name, script);
    app.interpreter = InterpreterMode::Interpreter(PathBuf::from("/bin/sh"));
    app
}
