use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::Value;

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_byte_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.1} {}", BYTE_UNITS[unit])
}

/// Renders a snapshot timestamp in local time.
///
/// Accepts what producers emit in practice: RFC 3339 strings, naive
/// `YYYY-MM-DDTHH:MM:SS` strings (read as local time) and epoch
/// milliseconds. Falsy values (`null`, `""`, `0`, `false`) yield `"Unknown"`,
/// and strings that do not parse are shown as-is.
pub fn format_timestamp(timestamp: Option<&Value>) -> String {
    match timestamp {
        None | Some(Value::Null) | Some(Value::Bool(false)) => "Unknown".to_string(),
        Some(Value::String(s)) if s.is_empty() => "Unknown".to_string(),
        Some(Value::String(s)) => parse_timestamp_str(s)
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Some(Value::Number(n)) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
            match millis {
                Some(0) | None => "Unknown".to_string(),
                Some(ms) => DateTime::from_timestamp_millis(ms)
                    .map(|dt| {
                        dt.with_timezone(&Local)
                            .format(TIMESTAMP_FORMAT)
                            .to_string()
                    })
                    .unwrap_or_else(|| n.to_string()),
            }
        }
        Some(_) => "Unknown".to_string(),
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Local>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local.from_local_datetime(&naive).earliest()
}

pub fn format_uptime(uptime: Option<&str>) -> String {
    match uptime {
        None | Some("") | Some("0m") => "Just started".to_string(),
        Some(u) => u.to_string(),
    }
}

pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
