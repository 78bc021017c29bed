use chrono::{DateTime, Duration, TimeZone};

/// Short label for a message timestamp: `HH:MM` today, `Yesterday`, otherwise `Mon D`.
#[must_use]
pub fn format_timestamp<Tz>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let day = ts.date_naive();
    let today = now.date_naive();
    if day == today {
        return ts.format("%H:%M").to_string();
    }
    if today
        .checked_sub_signed(Duration::days(1))
        .is_some_and(|yesterday| yesterday == day)
    {
        return "Yesterday".to_string();
    }
    ts.format("%b %-d").to_string()
}

/// Cut `text` to `max_len` characters, appending `...` when shortened.
#[must_use]
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let head: String = text.chars().take(max_len).collect();
    format!("{head}...")
}
