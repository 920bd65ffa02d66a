use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};

/// `ILIKE` pattern matching `term` anywhere, with LIKE wildcards in the term escaped.
pub fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Date window requested from the monitoring service: the calendar days
/// covering the last 24 hours ending at `now`.
pub fn fetch_window(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let from = now - TimeDelta::hours(24);
    (from.date_naive(), now.date_naive())
}

/// Next instant strictly after `now` at `hour:00:00` UTC.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        let tomorrow = now.date_naive().checked_add_days(Days::new(1)).unwrap_or(now.date_naive());
        tomorrow.and_time(at).and_utc()
    }
}
