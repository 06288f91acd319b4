use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Local;
use log::error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    signal,
    task::JoinHandle,
};

use crate::worklog::WorklogEntry;

/// 承認とみなす入力。
const APPROVAL_WORD: &str = "go";

/// Consoleにworklogを表示するためのtrait。
pub trait ConsolePresenter {
    /// worklogを表示する。
    ///
    /// # Arguments
    ///
    /// * `entries` - 表示するworklog
    fn show_worklogs(&mut self, entries: &[WorklogEntry]) -> Result<()>;
}

/// worklogを罫線のない表形式で表示する。
///
/// 列は日時、チケット、時間、alias、コメントの順で、2つの空白で区切る。
pub struct ConsolePlainTable<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsolePlainTable<'a, W> {
    /// 新しい`ConsolePlainTable`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W: Write> ConsolePresenter for ConsolePlainTable<'a, W> {
    fn show_worklogs(&mut self, entries: &[WorklogEntry]) -> Result<()> {
        let mut sorted_entries = entries.to_vec();
        sorted_entries.sort();

        let rows: Vec<[String; 5]> = sorted_entries
            .into_iter()
            .map(|entry| {
                [
                    human_date(&entry),
                    entry.ticket,
                    entry.duration,
                    entry.alias,
                    entry.message,
                ]
            })
            .collect();
        let mut widths = [0usize; 5];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        for row in &rows {
            let line = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ");
            writeln!(self.writer, "{}", line.trim_end())
                .with_context(|| format!("Failed to write worklog row: {:?}", row))?;
        }

        Ok(())
    }
}

/// worklogの開始日時をLocalタイムゾーンで表示用に整形する。
fn human_date(entry: &WorklogEntry) -> String {
    entry
        .date
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// 割り込みを監視するタスクを起動する。
///
/// Ctrl-Cを受けると`on_interrupt`を呼ぶ。監視はプロセスの終了まで続き、
/// プロンプトでの入力待ちに限らず取得やworklogの登録中の割り込みも対象になる。
pub fn spawn_interrupt_watcher<F>(on_interrupt: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => on_interrupt(),
            Err(err) => error!("Failed to listen for interrupt: {:?}", err),
        }
    })
}

/// メッセージを表示して1行読み込む。
///
/// 末尾の改行は含まない。入力が終端に達した場合は空文字列を返す。
pub async fn prompt<R: AsyncBufRead + Unpin>(reader: &mut R, message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// 確認の結果。
#[derive(Debug, PartialEq, Eq)]
pub enum Confirmation {
    Approved,
    Declined,
}

/// worklogの登録を確認する。
///
/// 前後の空白を除いた入力が`go`の場合だけ承認とする。
pub async fn confirm<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Confirmation> {
    let answer = prompt(reader, "Type 'go' to approve the above worklog: ").await?;
    if answer.trim() == APPROVAL_WORD {
        Ok(Confirmation::Approved)
    } else {
        Ok(Confirmation::Declined)
    }
}

#[cfg(test)]
mod tests {
    use std::{process::Command, time::Duration};

    use chrono::{DateTime, Local, TimeZone, Utc};
    use rstest::rstest;
    use tokio::{sync::oneshot, time};

    use super::{
        confirm, prompt, spawn_interrupt_watcher, Confirmation, ConsolePlainTable,
        ConsolePresenter,
    };
    use crate::worklog::WorklogEntry;

    fn worklog(hour: u32, ticket: &str, duration: &str, alias: &str, message: &str) -> WorklogEntry {
        WorklogEntry {
            date: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            ticket: ticket.to_string(),
            duration: duration.to_string(),
            alias: alias.to_string(),
            message: message.to_string(),
        }
    }

    fn local(date: DateTime<Utc>) -> String {
        date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
    }

    #[test]
    fn test_show_worklogs_no_entry() {
        let mut writer = Vec::new();
        let mut presenter = ConsolePlainTable::new(&mut writer);

        presenter.show_worklogs(&[]).unwrap();

        assert_eq!(String::from_utf8(writer).unwrap(), "");
    }

    /// 列幅が揃い、開始日時順に並ぶことを確認する。
    #[test]
    fn test_show_worklogs_aligned_and_sorted() {
        let late = worklog(10, "ENG-123", "15m", "", "review PR");
        let early = worklog(9, "DEL-340", "1h 30m", "ps", "fix bug");
        let mut writer = Vec::new();
        let mut presenter = ConsolePlainTable::new(&mut writer);

        presenter.show_worklogs(&[late.clone(), early.clone()]).unwrap();

        let expected = format!(
            "{}  DEL-340  1h 30m  ps  fix bug\n{}  ENG-123  15m         review PR\n",
            local(early.date),
            local(late.date),
        );
        assert_eq!(String::from_utf8(writer).unwrap(), expected);
    }

    #[test]
    fn test_show_worklogs_trims_trailing_space() {
        let entry = worklog(9, "HO-3201", "45m", "devops", "");
        let mut writer = Vec::new();
        let mut presenter = ConsolePlainTable::new(&mut writer);

        presenter.show_worklogs(&[entry.clone()]).unwrap();

        let expected = format!("{}  HO-3201  45m  devops\n", local(entry.date));
        assert_eq!(String::from_utf8(writer).unwrap(), expected);
    }

    #[rstest]
    #[case::go("go\n", Confirmation::Approved)]
    #[case::go_with_spaces("  go \r\n", Confirmation::Approved)]
    #[case::go_without_newline("go", Confirmation::Approved)]
    #[case::uppercase("GO\n", Confirmation::Declined)]
    #[case::yes("yes\n", Confirmation::Declined)]
    #[case::empty("\n", Confirmation::Declined)]
    #[case::eof("", Confirmation::Declined)]
    #[case::only_first_line("no\ngo\n", Confirmation::Declined)]
    #[tokio::test]
    async fn test_confirm(#[case] input: &str, #[case] expected: Confirmation) {
        let mut reader = input.as_bytes();

        assert_eq!(confirm(&mut reader).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_prompt_strips_newline() {
        let mut reader = "http://127.0.0.1/cb?oauth_verifier=abc\r\n".as_bytes();

        let answer = prompt(&mut reader, "Paste: ").await.unwrap();

        assert_eq!(answer, "http://127.0.0.1/cb?oauth_verifier=abc");
    }

    /// 確認を終えた後のCtrl-Cも監視タスクに届くことを確認する。
    #[tokio::test]
    async fn test_interrupt_after_confirm_is_handled() {
        let mut reader = "no\n".as_bytes();
        assert_eq!(confirm(&mut reader).await.unwrap(), Confirmation::Declined);

        let (sender, receiver) = oneshot::channel();
        let _watcher = spawn_interrupt_watcher(move || {
            let _ = sender.send(());
        });
        // 監視タスクがシグナルの登録を終えるまで待つ
        time::sleep(Duration::from_millis(200)).await;

        let status = Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let handled = time::timeout(Duration::from_secs(5), receiver).await;
        assert!(matches!(handled, Ok(Ok(()))));
    }
}
