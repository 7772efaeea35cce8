use chrono::Utc;
use std::collections::HashMap;

use procwatch_shared::{ExitKind, ProcessRecord, ProcessState};

/// 監視対象プロセスのレジストリ
///
/// 書き込みはスーパーバイザのイベントループのみが行う（single-writer）。
/// 状態表示やテストは snapshot 経由で読むだけ。
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: HashMap<String, ProcessRecord>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// アプリを Stopped 状態で登録
    pub fn register(&mut self, name: &str) {
        self.records
            .entry(name.to_string())
            .or_insert_with(|| ProcessRecord::new(name));
    }

    pub fn get(&self, name: &str) -> Option<&ProcessRecord> {
        self.records.get(name)
    }

    /// Stopped/Exited → Starting
    pub fn mark_starting(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.state = ProcessState::Starting;
            record.pid = None;
            record.started_at = None;
            record.last_state_change = Utc::now();
        }
    }

    /// Starting → Running
    pub fn mark_running(&mut self, name: &str, pid: u32) {
        if let Some(record) = self.records.get_mut(name) {
            let now = Utc::now();
            record.state = ProcessState::Running;
            record.pid = Some(pid);
            record.started_at = Some(now);
            record.last_state_change = now;
        }
    }

    /// Running/Starting → Exited
    pub fn mark_exited(&mut self, name: &str, exit: ExitKind) {
        if let Some(record) = self.records.get_mut(name) {
            record.state = ProcessState::Exited;
            record.pid = None;
            record.last_exit = Some(exit);
            record.last_state_change = Utc::now();
        }
    }

    /// 任意状態 → Stopped（終端）
    pub fn mark_stopped(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.state = ProcessState::Stopped;
            record.pid = None;
            record.last_state_change = Utc::now();
        }
    }

    /// 任意状態 → Failed（終端、再起動断念）
    pub fn mark_failed(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.state = ProcessState::Failed;
            record.pid = None;
            record.last_state_change = Utc::now();
        }
    }

    pub fn bump_restarts(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.restarts += 1;
        }
    }

    pub fn reset_restarts(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.restarts = 0;
        }
    }

    /// 現在実行中のプロセス（name, pid）
    pub fn running(&self) -> Vec<(String, u32)> {
        self.records
            .values()
            .filter(|r| r.state == ProcessState::Running)
            .filter_map(|r| r.pid.map(|pid| (r.name.clone(), pid)))
            .collect()
    }

    /// 全レコードのスナップショット（名前順）
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// 全アプリが終端状態に達したか
    pub fn all_settled(&self) -> bool {
        self.records.values().all(|r| !r.state.is_active())
    }
}
