use chrono::{DateTime, Local, NaiveDate, Utc};

/// 現在のUTC時刻を取得する。
///
/// OAuthのタイムスタンプと既定の開始日に利用する。
#[cfg(not(test))]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// テスト時に時刻を固定するための時計。
#[cfg(test)]
pub mod mock_clock {
    use std::cell::RefCell;

    use super::DateTime;
    use super::Utc;

    thread_local! {
        static FIXED_NOW: RefCell<Option<DateTime<Utc>>> = RefCell::new(None);
    }

    /// 固定された時刻があればそれを、なければ現在時刻を返す。
    pub fn now() -> DateTime<Utc> {
        FIXED_NOW.with(|cell| cell.borrow().as_ref().cloned().unwrap_or_else(Utc::now))
    }

    /// 時刻を固定する。
    pub fn freeze(time: DateTime<Utc>) {
        FIXED_NOW.with(|cell| *cell.borrow_mut() = Some(time));
    }

    pub fn unfreeze() {
        FIXED_NOW.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
pub use mock_clock::now;

/// Localタイムゾーンでの今日の日付を返す。
pub fn today() -> NaiveDate {
    now().with_timezone(&Local).date_naive()
}
