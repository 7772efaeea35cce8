use chrono::Utc;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::spawner::ProcessHandle;
use procwatch_shared::{OutputStream, ProcessEvent};

/// 子プロセスの stdout/stderr を行単位で転送するタスクを起動する
///
/// 各行は ProcessEvent::OutputLine として送信され、log_file 指定時は
/// ファイルにも追記する。戻り値はポンプタスクのハンドル。
pub fn pump_output(
    handle: &mut ProcessHandle,
    log_file: Option<PathBuf>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    if let Some(stdout) = handle.child.stdout.take() {
        tasks.push(spawn_pump(
            handle.name.clone(),
            OutputStream::Stdout,
            stdout,
            log_file.clone(),
            tx.clone(),
        ));
    }

    if let Some(stderr) = handle.child.stderr.take() {
        tasks.push(spawn_pump(
            handle.name.clone(),
            OutputStream::Stderr,
            stderr,
            log_file,
            tx,
        ));
    }

    tasks
}

fn spawn_pump<R>(
    name: String,
    stream: OutputStream,
    reader: R,
    log_file: Option<PathBuf>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut sink = match &log_file {
            Some(path) => {
                match tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                {
                    Ok(file) => Some(file),
                    Err(_) => None, // ログファイルが開けなくてもキャプチャは続行
                }
            }
            None => None,
        };

        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(file) = sink.as_mut() {
                let _ = file.write_all(line.as_bytes()).await;
                let _ = file.write_all(b"\n").await;
            }

            let event = ProcessEvent::OutputLine {
                name: name.clone(),
                stream,
                line,
                timestamp: Utc::now(),
            };

            // 受信側が終了していたらポンプも終了
            if tx.send(event).is_err() {
                break;
            }
        }
    })
}
