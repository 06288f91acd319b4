use std::collections::HashMap;

use crate::time_entry::TimeEntry;

/// 丸めの単位(秒)。15分。
pub const ROUND_UNIT: i64 = 15 * 60;

/// 秒数を`ROUND_UNIT`単位に丸める。
///
/// 半単位以上は切り上げる。丸めた結果が0でも、元の秒数が単位の1/4を超えていれば1単位とする。
pub fn round_duration(seconds: i64) -> i64 {
    let rounded = (seconds + ROUND_UNIT / 2).div_euclid(ROUND_UNIT) * ROUND_UNIT;
    if rounded == 0 && seconds > ROUND_UNIT / 4 {
        return ROUND_UNIT;
    }
    rounded
}

/// descriptionごとにtime entryを集計する。
///
/// 同じdescriptionを持つentryの`duration`を合計してから丸める。
/// `start`は最初に現れたentryのものを使い、丸めた結果が0のものは除外する。
/// 結果の順序は保証しない。
pub fn aggregate_entries(entries: Vec<TimeEntry>) -> Vec<TimeEntry> {
    let mut jobs: HashMap<String, TimeEntry> = HashMap::new();
    for entry in entries {
        match jobs.get_mut(&entry.description) {
            Some(job) => job.duration += entry.duration,
            None => {
                jobs.insert(entry.description.clone(), entry);
            }
        }
    }

    jobs.into_values()
        .filter_map(|mut job| {
            job.duration = round_duration(job.duration);
            (job.duration != 0).then_some(job)
        })
        .collect()
}
