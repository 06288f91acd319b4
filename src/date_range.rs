use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

/// 日付文字列の書式。
const DATE_FORMAT: &str = "%Y-%m-%d";

/// 取得対象となる日付の範囲(両端を含む)。
///
/// # Examples
///
/// ```ignore
/// let mut range = DateRange::parse("2024-01-01", Some("2024-01-03")).unwrap();
/// range.decrement_day();
/// assert_eq!(range.dates().len(), 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// 開始日と終了日から新しい`DateRange`を返す。
    ///
    /// 終了日が開始日より前の場合はエラーを返す。
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self> {
        let end = end.unwrap_or(start);
        if end < start {
            bail!("End date {} is before start date {}", end, start);
        }

        Ok(Self { start, end })
    }

    /// `YYYY-MM-DD`形式の文字列から新しい`DateRange`を返す。
    ///
    /// # Arguments
    ///
    /// * `start` - 開始日
    /// * `end` - 終了日。省略した場合は開始日と同じ日になる
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self> {
        let start = parse_date(start)?;
        let end = end.map(parse_date).transpose()?;

        Self::new(start, end)
    }

    /// 範囲に含まれる日付を古い順に返す。
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|date| *date <= self.end)
            .collect()
    }

    /// 開始日を1日前にずらして範囲を広げる。
    pub fn decrement_day(&mut self) -> Result<()> {
        self.start = self
            .start
            .pred_opt()
            .with_context(|| format!("Cannot move before {}", self.start))?;
        Ok(())
    }

    /// Localタイムゾーンでの範囲の開始日時と終了日時をUTCで返す。
    ///
    /// 終了日時は終了日の翌日00:00:00とする。
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start_at = local_midnight(self.start)?;
        let next_day = self
            .end
            .succ_opt()
            .with_context(|| format!("Cannot move after {}", self.end))?;
        let end_at = local_midnight(next_day)?;
        Ok((start_at, end_at))
    }
}

/// 日付をパースする。
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("Failed to parse date: {}", s))
}

/// Localタイムゾーンでの指定日の00:00:00をUTCで返す。
fn local_midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive_datetime = date
        .and_hms_opt(0, 0, 0)
        .context("Failed to set hour, minute, and second")?;
    let datetime = Local
        .from_local_datetime(&naive_datetime)
        .earliest()
        .context("Failed to convert to DateTime<Local>")?
        .to_utc();

    Ok(datetime)
}
