use chrono::{DateTime, Utc};

/// Togglから取得したtime entry。
///
/// 集計後も同じ型を使い、その場合`start`は最初に現れたentryの開始日時、
/// `duration`は丸め済みの合計秒数になる。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEntry {
    pub description: String,
    pub start: DateTime<Utc>,
    pub duration: i64,
}
