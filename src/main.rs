use std::{
    path::PathBuf,
    process::{self, ExitCode},
};

use anyhow::{Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};
use tokio::io::{self, BufReader};

mod aggregate;
mod alias;
mod config;
mod console;
mod date_range;
mod datetime;
mod jira;
mod oauth;
mod session;
mod sync_command;
mod time_entry;
mod toggl;
mod worklog;

use alias::AliasTable;
use config::Config;
use console::{Confirmation, ConsolePlainTable, ConsolePresenter};
use date_range::DateRange;
use jira::JiraClient;
use oauth::OAuthSigner;
use session::{Authorizer, SessionCache};
use sync_command::{post_worklogs, SyncCommand};
use toggl::TogglClient;

/// 実行の結果。それぞれが終了コードに対応する。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    /// worklogを登録した。
    Posted,
    /// 操作者が登録を承認しなかった。
    Declined,
    /// 日付の範囲が不正だった。
    InvalidRange,
    /// Ctrl-Cで中断された。
    Interrupted,
}

impl Outcome {
    /// 終了コードを返す。
    fn code(self) -> u8 {
        match self {
            Outcome::Posted | Outcome::Declined => 0,
            Outcome::InvalidRange => 1,
            Outcome::Interrupted => 2,
        }
    }
}

/// Togglのtime entryをJiraのworklogとして登録するCLIアプリケーション。
///
/// # Examples
/// ```text
/// $ cargo run -- 2024-01-01
/// $ cargo run -- 2024-01-01 2024-01-05 --verbose
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(help = "First day to load in the format YYYY-MM-DD [default: today]")]
    start_date: Option<String>,

    #[clap(help = "Last day to load in the format YYYY-MM-DD [default: start date]")]
    end_date: Option<String>,

    #[clap(short = 'v', long = "verbose", help = "Show progress while loading")]
    verbose: bool,

    #[clap(
        long = "max-lookback-days",
        default_value = "14",
        help = "Days to look back when no time entries are found"
    )]
    max_lookback_days: u32,

    #[clap(
        long = "aliases",
        value_name = "FILE",
        help = "JSON file of aliases to merge over the built-in ones"
    )]
    aliases: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // 読み込み中のstdinがruntimeの終了を妨げるため、割り込み時は直接終了する
    console::spawn_interrupt_watcher(|| {
        println!();
        process::exit(Outcome::Interrupted.code().into());
    });
    setup_logger(args.verbose).context("Failed to set up logger")?;

    let outcome = run(args).await?;
    Ok(ExitCode::from(outcome.code()))
}

/// ログの出力先と出力レベルを設定する。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;

    Ok(())
}

async fn run(args: Args) -> Result<Outcome> {
    let range = match resolve_range(args.start_date.as_deref(), args.end_date.as_deref()) {
        Ok(range) => range,
        Err(err) => {
            eprintln!("{:#}", err);
            return Ok(Outcome::InvalidRange);
        }
    };

    let config = Config::from_env().context("Failed to load configuration")?;

    let mut aliases = AliasTable::default();
    if let Some(path) = &args.aliases {
        aliases.extend_from_file(path)?;
    }

    let mut stdin = BufReader::new(io::stdin());
    let toggl = TogglClient::new(&config.toggl_api_url, &config.toggl_api_token);
    let jira = connect_jira(&config, &mut stdin).await?;

    let command = SyncCommand::new(&toggl, &aliases, args.max_lookback_days, args.verbose);
    let worklogs = command.run(range).await?;

    let mut stdout = std::io::stdout();
    ConsolePlainTable::new(&mut stdout).show_worklogs(&worklogs)?;

    if console::confirm(&mut stdin).await? == Confirmation::Declined {
        return Ok(Outcome::Declined);
    }

    post_worklogs(&jira, &worklogs).await?;

    Ok(Outcome::Posted)
}

/// 引数の日付から取得範囲を作成する。開始日が省略された場合は今日とする。
fn resolve_range(start_date: Option<&str>, end_date: Option<&str>) -> Result<DateRange> {
    match start_date {
        Some(start_date) => DateRange::parse(start_date, end_date),
        None => DateRange::parse(&datetime::today().to_string(), end_date),
    }
}

/// 保存されたセッションを使ってJiraに接続する。
///
/// セッションがない場合はブラウザでの認可を行い、取得したアクセストークンを保存する。
async fn connect_jira(config: &Config, stdin: &mut BufReader<io::Stdin>) -> Result<JiraClient> {
    let signer = OAuthSigner::from_pem_file(&config.jira_consumer_key, &config.jira_private_key_file)?;
    let cache = SessionCache::new(&config.session_file);

    let token = match cache.load() {
        Some(token) => token,
        None => {
            info!("No saved session, starting authorization");
            let token = Authorizer::new(&config.jira_server, &config.jira_callback_uri, &signer)
                .authorize(stdin)
                .await
                .context("Failed to authorize with Jira")?;
            cache.save(&token)?;
            token
        }
    };

    Ok(JiraClient::new(&config.jira_server, signer, token))
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};
    use clap::Parser;
    use rstest::rstest;

    use super::{resolve_range, run, Args, Outcome};
    use crate::{date_range::DateRange, datetime::mock_clock};

    #[rstest]
    #[case::posted(Outcome::Posted, 0)]
    #[case::declined(Outcome::Declined, 0)]
    #[case::invalid_range(Outcome::InvalidRange, 1)]
    #[case::interrupted(Outcome::Interrupted, 2)]
    fn test_outcome_code(#[case] outcome: Outcome, #[case] expected: u8) {
        assert_eq!(outcome.code(), expected);
    }

    /// 日付が不正な場合は設定を読み込む前に終了する。
    #[rstest]
    #[case::end_before_start(&["toggl2jira", "2024-01-02", "2024-01-01"])]
    #[case::unparseable_start(&["toggl2jira", "yesterday"])]
    #[case::unparseable_end(&["toggl2jira", "2024-01-01", "2024-01-32"])]
    #[tokio::test]
    async fn test_run_invalid_range(#[case] argv: &[&str]) {
        let args = Args::parse_from(argv.iter().copied());

        assert_eq!(run(args).await.unwrap(), Outcome::InvalidRange);
    }

    #[test]
    fn test_resolve_range_defaults_to_today() {
        let noon = Local.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        mock_clock::freeze(noon.to_utc());

        let range = resolve_range(None, None).unwrap();

        mock_clock::unfreeze();
        assert_eq!(range, DateRange::new(noon.date_naive(), None).unwrap());
    }
}
