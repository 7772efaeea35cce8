use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

use procwatch_shared::{AppDescriptor, InterpreterMode, SpawnError};

/// 起動済みプロセスのハンドル
#[derive(Debug)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: Option<u32>,
    pub child: Child,
    pub started_at: DateTime<Utc>,
}

/// 記述子から実際の起動形を解決する
///
/// interpreter が "none" ならスクリプトをそのまま実行ファイルとして起動、
/// インタプリタ指定ありならスクリプトパスを第一引数に前置する。
pub fn resolve_invocation(app: &AppDescriptor) -> (PathBuf, Vec<String>) {
    match &app.interpreter {
        InterpreterMode::None => (app.script.clone(), app.args.clone()),
        InterpreterMode::Interpreter(bin) => {
            let mut argv = Vec::with_capacity(app.args.len() + 1);
            argv.push(app.script.to_string_lossy().into_owned());
            argv.extend(app.args.iter().cloned());
            (bin.clone(), argv)
        }
    }
}

/// 継承環境とオーバーレイをマージする
///
/// キー衝突時はオーバーレイが優先。
pub fn merged_environment(
    inherited: impl Iterator<Item = (String, String)>,
    overlay: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut merged: HashMap<String, String> = inherited.collect();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged.into_iter().collect()
}

/// コマンド文字列を生成（デバッグ用）
pub fn command_line(app: &AppDescriptor) -> String {
    let (program, argv) = resolve_invocation(app);
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(argv);
    parts.join(" ")
}

/// アプリプロセスを起動する（出力はパイプでキャプチャ）
///
/// 子プロセスの環境は継承環境 + オーバーレイのマージ結果。
pub fn spawn_app(app: &AppDescriptor) -> Result<ProcessHandle, SpawnError> {
    let (program, argv) = resolve_invocation(app);

    let mut cmd = Command::new(&program);
    cmd.args(&argv);

    cmd.env_clear();
    cmd.envs(merged_environment(std::env::vars(), &app.env));

    if let Some(cwd) = &app.cwd {
        cmd.current_dir(cwd);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // watcher タスクが中断されても子プロセスを残さない
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SpawnError::NotFound {
                name: app.name.clone(),
                program: program.clone(),
            }
        } else {
            SpawnError::Io {
                name: app.name.clone(),
                source: e,
            }
        }
    })?;

    Ok(ProcessHandle {
        name: app.name.clone(),
        pid: child.id(),
        child,
        started_at: Utc::now(),
    })
}

/// アプリをフォアグラウンドで直接実行（パススルー）
pub async fn run_foreground(app: &AppDescriptor) -> Result<std::process::ExitStatus> {
    let (program, argv) = resolve_invocation(app);

    let mut cmd = Command::new(&program);
    cmd.args(&argv);
    cmd.envs(&app.env);

    if let Some(cwd) = &app.cwd {
        cmd.current_dir(cwd);
    }

    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = cmd.status().await?;
    Ok(status)
}
