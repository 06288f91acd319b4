use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{alias::AliasTable, time_entry::TimeEntry};

/// Jiraに登録するworklog。
///
/// フィールドの宣言順で比較されるため、ソートすると開始日時順になる。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorklogEntry {
    pub date: DateTime<Utc>,
    pub ticket: String,
    pub duration: String,
    pub alias: String,
    pub message: String,
}

impl WorklogEntry {
    /// 集計済みのtime entryからworklogを作成する。
    ///
    /// descriptionの最初の単語をaliasとして解決し、残りをコメントとする。
    /// 最初の単語がaliasでなかった場合、`alias`は空になる。
    pub fn from_time_entry(entry: &TimeEntry, aliases: &AliasTable) -> Result<Self> {
        let (name, message) = entry
            .description
            .split_once(' ')
            .unwrap_or((entry.description.as_str(), ""));
        let ticket = aliases.resolve(name)?;
        let alias = if ticket == name { "" } else { name };

        Ok(Self {
            date: entry.start,
            ticket: ticket.to_uppercase(),
            duration: format_duration(entry.duration),
            alias: alias.to_string(),
            message: message.to_string(),
        })
    }
}

/// 秒数を`1h 30m`や`45m`の形式に変換する。
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
