use anyhow::Result;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::registry::ProcessRegistry;
use procwatch_launcher::output::pump_output;
use procwatch_launcher::spawner::{command_line, spawn_app};
use procwatch_shared::logging::LogCategory;
use procwatch_shared::{
    log_debug, log_error, log_info, log_lifecycle, log_restart, log_spawn, log_system, log_warn,
    AppDescriptor, ExitKind, ProcessEvent, RestartDecision, RestartPolicy, SupervisorSettings,
};

/// 宣言されたアプリ群を起動し、終了を監視して再起動ポリシーを適用する
///
/// 子プロセスごとに watcher タスクが 1 つ付き、終了を ProcessEvent として
/// イベントループへ送る。レジストリの書き込みはこのループだけが行う。
pub struct Supervisor {
    apps: HashMap<String, AppDescriptor>,
    /// 起動順を安定させるための宣言順リスト
    order: Vec<String>,
    settings: SupervisorSettings,
    registry: Arc<RwLock<ProcessRegistry>>,
    event_tx: mpsc::UnboundedSender<ProcessEvent>,
    event_rx: mpsc::UnboundedReceiver<ProcessEvent>,
    respawn_tx: mpsc::UnboundedSender<String>,
    respawn_rx: mpsc::UnboundedReceiver<String>,
    tasks: Vec<JoinHandle<()>>,
    pending_respawns: HashSet<String>,
}

impl Supervisor {
    pub fn new(apps: Vec<AppDescriptor>, settings: SupervisorSettings) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (respawn_tx, respawn_rx) = mpsc::unbounded_channel();

        let mut registry = ProcessRegistry::new();
        let mut map = HashMap::new();
        let mut order = Vec::new();

        for app in apps {
            registry.register(&app.name);
            order.push(app.name.clone());
            map.insert(app.name.clone(), app);
        }

        Self {
            apps: map,
            order,
            settings,
            registry: Arc::new(RwLock::new(registry)),
            event_tx,
            event_rx,
            respawn_tx,
            respawn_rx,
            tasks: Vec::new(),
            pending_respawns: HashSet::new(),
        }
    }

    /// レジストリへの参照を取得（読み取り用）
    pub fn registry(&self) -> Arc<RwLock<ProcessRegistry>> {
        Arc::clone(&self.registry)
    }

    /// 全アプリを起動する
    pub async fn start(&mut self) -> Result<()> {
        for name in self.order.clone() {
            self.launch(&name).await;
        }
        Ok(())
    }

    /// 1 アプリを起動し、watcher と出力ポンプを取り付ける
    async fn launch(&mut self, name: &str) {
        let Some(app) = self.apps.get(name).cloned() else {
            return;
        };

        self.registry.write().await.mark_starting(name);
        log_spawn!(debug, "launching '{}': {}", name, command_line(&app));

        match spawn_app(&app) {
            Ok(mut handle) => {
                let pid = handle.pid.unwrap_or(0);

                self.tasks.extend(pump_output(
                    &mut handle,
                    app.log_file.clone(),
                    self.event_tx.clone(),
                ));

                // 起動完了もイベントとして流し、状態遷移をループに一本化する
                let _ = self.event_tx.send(ProcessEvent::Started {
                    name: name.to_string(),
                    pid,
                    timestamp: Utc::now(),
                });

                let watch_name = name.to_string();
                let watch_tx = self.event_tx.clone();
                self.tasks.push(tokio::spawn(async move {
                    let exit = match handle.child.wait().await {
                        Ok(status) => ExitKind::from(status),
                        Err(_) => ExitKind::Unknown,
                    };
                    let _ = watch_tx.send(ProcessEvent::Exited {
                        name: watch_name,
                        exit,
                        timestamp: Utc::now(),
                    });
                }));
            }
            Err(e) => {
                log_spawn!(error, "failed to spawn '{name}': {e}");
                let _ = self.event_tx.send(ProcessEvent::SpawnFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// アプリに適用する再起動ポリシーを取得
    fn policy_for(&self, name: &str) -> RestartPolicy {
        self.apps
            .get(name)
            .and_then(|app| app.restart.clone())
            .unwrap_or_else(|| self.settings.restart.clone())
    }

    /// イベント・再起動通知を 1 件処理する
    pub async fn tick(&mut self) -> Result<()> {
        tokio::select! {
            Some(event) = self.event_rx.recv() => {
                self.handle_event(event).await;
            }
            Some(name) = self.respawn_rx.recv() => {
                self.handle_respawn(name).await;
            }
        }
        Ok(())
    }

    /// 全アプリが終端状態になるまでイベントを処理する
    pub async fn run_until_settled(&mut self) -> Result<()> {
        while !self.settled().await {
            self.tick().await?;
        }
        Ok(())
    }

    /// シグナル処理付きのメインループ
    pub async fn run(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            loop {
                tokio::select! {
                    Some(event) = self.event_rx.recv() => {
                        self.handle_event(event).await;
                        if self.settled().await {
                            break;
                        }
                    }
                    Some(name) = self.respawn_rx.recv() => {
                        self.handle_respawn(name).await;
                    }
                    _ = sigint.recv() => {
                        log_info!(LogCategory::Signal, "received SIGINT");
                        self.shutdown().await;
                        break;
                    }
                    _ = sigterm.recv() => {
                        log_info!(LogCategory::Signal, "received SIGTERM");
                        self.shutdown().await;
                        break;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            loop {
                tokio::select! {
                    Some(event) = self.event_rx.recv() => {
                        self.handle_event(event).await;
                        if self.settled().await {
                            break;
                        }
                    }
                    Some(name) = self.respawn_rx.recv() => {
                        self.handle_respawn(name).await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        log_info!(LogCategory::Signal, "received Ctrl+C");
                        self.shutdown().await;
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// 全アプリが終端状態で、かつ再起動予約が無いか
    pub async fn settled(&self) -> bool {
        self.pending_respawns.is_empty() && self.registry.read().await.all_settled()
    }

    async fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Started { name, pid, .. } => {
                self.registry.write().await.mark_running(&name, pid);
                log_lifecycle!(info, "🟢 '{name}' running (pid {pid})");
            }

            ProcessEvent::Exited { name, exit, .. } => {
                {
                    let mut registry = self.registry.write().await;

                    // 安定稼働していた場合は連続再起動カウンタをリセット
                    let policy = self.policy_for(&name);
                    if let Some(record) = registry.get(&name) {
                        if let Some(started_at) = record.started_at {
                            let uptime = (Utc::now() - started_at)
                                .to_std()
                                .unwrap_or(Duration::ZERO);
                            if uptime >= policy.min_uptime() {
                                registry.reset_restarts(&name);
                            }
                        }
                    }

                    registry.mark_exited(&name, exit);
                }

                log_lifecycle!(info, "🔵 '{name}' exited ({exit})");
                self.apply_policy(&name, exit).await;
            }

            ProcessEvent::SpawnFailed { name, error, .. } => {
                log_error!(LogCategory::Spawn, "'{name}' spawn failed: {error}");
                self.registry
                    .write()
                    .await
                    .mark_exited(&name, ExitKind::Unknown);
                self.apply_policy(&name, ExitKind::Unknown).await;
            }

            ProcessEvent::OutputLine {
                name, stream, line, ..
            } => {
                log_info!(LogCategory::Output, "[{}:{}] {}", name, stream.as_str(), line);
            }
        }
    }

    /// 終了したアプリに再起動ポリシーを適用する
    async fn apply_policy(&mut self, name: &str, exit: ExitKind) {
        let policy = self.policy_for(name);
        let restarts = self
            .registry
            .read()
            .await
            .get(name)
            .map(|r| r.restarts)
            .unwrap_or(0);

        match policy.decide(&exit, restarts) {
            RestartDecision::Restart { delay } => {
                self.registry.write().await.bump_restarts(name);
                self.pending_respawns.insert(name.to_string());
                log_restart!(
                    info,
                    "⏳ restarting '{}' in {:?} (attempt {})",
                    name,
                    delay,
                    restarts + 1
                );

                let respawn_tx = self.respawn_tx.clone();
                let respawn_name = name.to_string();
                self.tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = respawn_tx.send(respawn_name);
                }));
            }
            RestartDecision::Stop => {
                self.registry.write().await.mark_stopped(name);
                log_lifecycle!(info, "⚪ '{name}' stopped");
            }
            RestartDecision::GiveUp => {
                self.registry.write().await.mark_failed(name);
                log_restart!(warn, "🔴 giving up on '{name}' after {restarts} restarts");
            }
        }
    }

    async fn handle_respawn(&mut self, name: String) {
        self.pending_respawns.remove(&name);

        // 予約後に手動停止などで終端へ遷移していたら起動しない
        let still_exited = self
            .registry
            .read()
            .await
            .get(&name)
            .map(|r| r.state == procwatch_shared::ProcessState::Exited)
            .unwrap_or(false);

        if still_exited {
            self.launch(&name).await;
        } else {
            log_debug!(LogCategory::Restart, "skipping respawn of '{name}'");
        }
    }

    /// 全プロセスを穏当に停止する
    ///
    /// SIGTERM → 猶予時間 → 残存は watcher 中断時の kill_on_drop で SIGKILL。
    pub async fn shutdown(&mut self) {
        log_system!(info, "🛑 stopping all apps...");

        let running = self.registry.read().await.running();

        #[cfg(unix)]
        for (name, pid) in &running {
            log_info!(LogCategory::Signal, "sending SIGTERM to '{name}' (pid {pid})");
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(*pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }

        // 猶予時間内の退出をイベントとして回収する（再起動はしない）
        if !running.is_empty() {
            let grace = Duration::from_millis(self.settings.shutdown_grace_ms);
            let deadline = tokio::time::Instant::now() + grace;

            loop {
                if self.registry.read().await.running().is_empty() {
                    break;
                }

                match tokio::time::timeout_at(deadline, self.event_rx.recv()).await {
                    Ok(Some(ProcessEvent::Exited { name, exit, .. })) => {
                        let mut registry = self.registry.write().await;
                        registry.mark_exited(&name, exit);
                        registry.mark_stopped(&name);
                        log_lifecycle!(debug, "'{name}' exited during shutdown ({exit})");
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
        }

        // watcher 中断で残存プロセスは kill_on_drop により強制終了される
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.pending_respawns.clear();

        let mut registry = self.registry.write().await;
        for name in &self.order {
            let active = registry
                .get(name)
                .map(|r| r.state.is_active())
                .unwrap_or(false);
            if active {
                registry.mark_stopped(name);
            }
        }

        log_system!(info, "✅ all apps stopped");
    }
}
