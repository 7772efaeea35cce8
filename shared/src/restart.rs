use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::ExitKind;

/// 再起動モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    /// 終了理由を問わず再起動する
    Always,
    /// 異常終了（非ゼロ終了コード・シグナル）のみ再起動する
    OnFailure,
    /// 再起動しない
    Never,
}

impl Default for RestartMode {
    fn default() -> Self {
        RestartMode::Always
    }
}

/// 再起動ポリシー
///
/// 元のマニフェスト形式には現れないため、スーパーバイザ側のデフォルトとして
/// 供給される。アプリ記述子で個別に上書きできる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default)]
    pub mode: RestartMode,

    /// 連続再起動の上限（min_uptime_ms 以上生存するとカウンタはリセット）
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// 初回再起動までの待ち時間（ミリ秒）。以降は指数的に増加する
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// バックオフの上限（ミリ秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// この時間以上生存したら安定稼働とみなす（ミリ秒）
    #[serde(default = "default_min_uptime_ms")]
    pub min_uptime_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            mode: RestartMode::default(),
            max_restarts: default_max_restarts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            min_uptime_ms: default_min_uptime_ms(),
        }
    }
}

// デフォルト値関数
fn default_max_restarts() -> u32 {
    16
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    15_000
}

fn default_min_uptime_ms() -> u64 {
    1_000
}

/// プロセス終了時の判断結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// 指定の待ち時間後に再起動する
    Restart { delay: Duration },
    /// 正常系として停止状態に遷移する
    Stop,
    /// 再起動上限に達したため断念する
    GiveUp,
}

impl RestartPolicy {
    /// 終了状態とこれまでの再起動回数から次のアクションを決める
    pub fn decide(&self, exit: &ExitKind, restarts: u32) -> RestartDecision {
        match self.mode {
            RestartMode::Never => RestartDecision::Stop,
            RestartMode::OnFailure if exit.is_success() => RestartDecision::Stop,
            _ => {
                if restarts >= self.max_restarts {
                    RestartDecision::GiveUp
                } else {
                    RestartDecision::Restart {
                        delay: self.backoff_for(restarts),
                    }
                }
            }
        }
    }

    /// n 回目の再起動に適用するバックオフ
    pub fn backoff_for(&self, restarts: u32) -> Duration {
        let exp = restarts.min(16);
        let ms = self
            .backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn min_uptime(&self) -> Duration {
        Duration::from_millis(self.min_uptime_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: RestartMode) -> RestartPolicy {
        RestartPolicy {
            mode,
            max_restarts: 3,
            backoff_ms: 100,
            max_backoff_ms: 1_000,
            min_uptime_ms: 0,
        }
    }

    #[test]
    fn test_never_mode_stops() {
        let p = policy(RestartMode::Never);
        assert_eq!(p.decide(&ExitKind::Code(1), 0), RestartDecision::Stop);
        assert_eq!(p.decide(&ExitKind::Code(0), 0), RestartDecision::Stop);
    }

    #[test]
    fn test_on_failure_mode() {
        let p = policy(RestartMode::OnFailure);

        // 正常終了は停止
        assert_eq!(p.decide(&ExitKind::Code(0), 0), RestartDecision::Stop);

        // 異常終了は再起動
        assert_eq!(
            p.decide(&ExitKind::Code(1), 0),
            RestartDecision::Restart {
                delay: Duration::from_millis(100)
            }
        );

        // シグナル死も異常扱い
        assert!(matches!(
            p.decide(&ExitKind::Signal(9), 0),
            RestartDecision::Restart { .. }
        ));
    }

    #[test]
    fn test_always_mode_restarts_on_success() {
        let p = policy(RestartMode::Always);
        assert!(matches!(
            p.decide(&ExitKind::Code(0), 0),
            RestartDecision::Restart { .. }
        ));
    }

    #[test]
    fn test_max_restarts_gives_up() {
        let p = policy(RestartMode::Always);
        assert!(matches!(
            p.decide(&ExitKind::Code(1), 2),
            RestartDecision::Restart { .. }
        ));
        assert_eq!(p.decide(&ExitKind::Code(1), 3), RestartDecision::GiveUp);
        assert_eq!(p.decide(&ExitKind::Code(1), 10), RestartDecision::GiveUp);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let p = policy(RestartMode::Always);
        assert_eq!(p.backoff_for(0), Duration::from_millis(100));
        assert_eq!(p.backoff_for(1), Duration::from_millis(200));
        assert_eq!(p.backoff_for(2), Duration::from_millis(400));

        // 上限で頭打ち
        assert_eq!(p.backoff_for(10), Duration::from_millis(1_000));
        assert_eq!(p.backoff_for(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_policy_defaults() {
        let p = RestartPolicy::default();
        assert_eq!(p.mode, RestartMode::Always);
        assert_eq!(p.max_restarts, 16);
        assert_eq!(p.backoff_ms, 100);
    }
}
