use chrono::{DateTime, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Milliseconds elapsed since `start`, a value from [`time_millis`].
pub fn elapsed_millis(start: i64) -> i64 {
    time_millis() - start
}
