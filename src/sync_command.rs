use anyhow::{bail, Context, Result};
use log::info;

use crate::{
    aggregate::aggregate_entries,
    alias::AliasTable,
    date_range::DateRange,
    jira::WorklogRepository,
    time_entry::TimeEntry,
    toggl::TogglRepository,
    worklog::WorklogEntry,
};

/// Togglのtime entryからJiraに登録するworklogを作成する。
pub struct SyncCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
    aliases: &'a AliasTable,
    max_lookback_days: u32,
    verbose: bool,
}

impl<'a, T: TogglRepository> SyncCommand<'a, T> {
    /// 新しい`SyncCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    /// * `aliases` - aliasの対応表
    /// * `max_lookback_days` - time entryが見つからない時に遡る最大日数
    /// * `verbose` - 取得する期間を表示するかどうか
    pub fn new(
        toggl_client: &'a T,
        aliases: &'a AliasTable,
        max_lookback_days: u32,
        verbose: bool,
    ) -> Self {
        Self {
            toggl_client,
            aliases,
            max_lookback_days,
            verbose,
        }
    }

    /// 指定された期間のtime entryを取得し、開始日時順のworklogにして返す。
    ///
    /// time entryが1件もない場合は開始日を1日ずつ遡って再取得する。
    /// `max_lookback_days`日遡っても見つからない場合はエラーを返す。
    pub async fn run(&self, mut range: DateRange) -> Result<Vec<WorklogEntry>> {
        let mut lookback = 0;
        loop {
            let dates = range
                .dates()
                .iter()
                .map(|date| date.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if self.verbose {
                println!("Loading activity for {}", dates);
            }
            let (start_at, end_at) = range.bounds()?;
            info!("Start at: {}, End at: {}", start_at, end_at);

            let time_entries = self
                .toggl_client
                .read_time_entries(&start_at, &end_at)
                .await
                .context("Failed to retrieve time entries")?;
            if !time_entries.is_empty() {
                info!("Time entries retrieved successfully.");
                return build_worklogs(time_entries, self.aliases);
            }

            if lookback >= self.max_lookback_days {
                bail!(
                    "No time entries found for {} after looking back {} days",
                    dates,
                    lookback
                );
            }
            lookback += 1;
            range.decrement_day()?;
        }
    }
}

/// time entryを集計し、aliasを解決したworklogを開始日時順に並べて返す。
pub fn build_worklogs(
    time_entries: Vec<TimeEntry>,
    aliases: &AliasTable,
) -> Result<Vec<WorklogEntry>> {
    let mut worklogs = aggregate_entries(time_entries)
        .iter()
        .map(|entry| WorklogEntry::from_time_entry(entry, aliases))
        .collect::<Result<Vec<_>>>()?;
    worklogs.sort();

    Ok(worklogs)
}

/// worklogを順番に登録する。
///
/// 途中で失敗した場合はそれ以降を登録せずにエラーを返す。登録済みのworklogは取り消さない。
pub async fn post_worklogs<W: WorklogRepository>(
    repository: &W,
    worklogs: &[WorklogEntry],
) -> Result<()> {
    for worklog in worklogs {
        println!("Adding {} to {}", worklog.duration, worklog.ticket);
        repository
            .add_worklog(worklog)
            .await
            .with_context(|| format!("Failed to add worklog to {}", worklog.ticket))?;
    }

    Ok(())
}
