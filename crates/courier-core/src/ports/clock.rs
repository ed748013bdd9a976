//! Clock port - 時刻の抽象化
//!
//! `dispatch_at` が「いつまで待つか」を計算するために使います。
//!
//! # テスト容易性
//! - trait により時刻を差し替え可能
//! - テストでは FixedClock を使用

use chrono::{DateTime, Utc};

/// Clock は現在時刻を提供
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
