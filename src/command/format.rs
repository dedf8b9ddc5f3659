//! Display and speech renderings of system statistics

use serde_json::Value;

const BYTE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Binary-prefixed size, two decimals at most: 1536 -> "1.5 KB"
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    while unit + 1 < BYTE_UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, BYTE_UNITS[unit])
}

fn split_uptime(seconds: u64) -> (u64, u64, u64) {
    (seconds / 86_400, (seconds % 86_400) / 3_600, (seconds % 3_600) / 60)
}

/// Compact uptime: 3725 -> "1h 2m"; under a minute -> "45s"
pub fn format_uptime(seconds: u64) -> String {
    let (days, hours, minutes) = split_uptime(seconds);
    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m")]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect();

    if parts.is_empty() {
        format!("{}s", seconds)
    } else {
        parts.join(" ")
    }
}

/// Spoken uptime: 3725 -> "1 hour and 2 minutes"
pub fn format_uptime_speech(seconds: u64) -> String {
    let (days, hours, minutes) = split_uptime(seconds);
    let parts: Vec<String> = [(days, "day"), (hours, "hour"), (minutes, "minute")]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{} {}{}", n, unit, if *n == 1 { "" } else { "s" }))
        .collect();

    if parts.is_empty() {
        "a few seconds".to_string()
    } else {
        parts.join(" and ")
    }
}

/// Render a numeric field as received: 42 stays "42", 42.5 stays "42.5"
fn number(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field<'a>(stats: &'a Value, name: &str) -> Option<&'a Value> {
    stats.get(name).filter(|v| !v.is_null())
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// One line per recognised field, in fixed order; `None` if none present
pub fn stats_display(stats: &Value) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(cpu) = field(stats, "cpu_percent") {
        lines.push(format!("CPU Usage: {}%", number(cpu)));
    }
    if let Some(memory) = field(stats, "memory_percent") {
        lines.push(format!("Memory Usage: {}%", number(memory)));
    }
    if let (Some(used), Some(total)) = (
        field(stats, "memory_used").and_then(as_u64),
        field(stats, "memory_total").and_then(as_u64),
    ) {
        lines.push(format!("Memory: {} / {}", format_bytes(used), format_bytes(total)));
    }
    if let Some(disk) = field(stats, "disk_usage") {
        lines.push(format!("Disk Usage: {}%", number(disk)));
    }
    if let Some(uptime) = field(stats, "uptime").and_then(as_u64) {
        lines.push(format!("Uptime: {}", format_uptime(uptime)));
    }
    if let Some(count) = field(stats, "process_count") {
        lines.push(format!("Processes: {}", number(count)));
    }

    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Spoken summary; `None` if no spoken field is present
pub fn stats_speech(stats: &Value) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(cpu) = field(stats, "cpu_percent") {
        parts.push(format!("CPU usage is {} percent", number(cpu)));
    }
    if let Some(memory) = field(stats, "memory_percent") {
        parts.push(format!("memory usage is {} percent", number(memory)));
    }
    if let Some(disk) = field(stats, "disk_usage") {
        parts.push(format!("disk usage is {} percent", number(disk)));
    }
    if let Some(uptime) = field(stats, "uptime").and_then(as_u64) {
        parts.push(format!("system uptime is {}", format_uptime_speech(uptime)));
    }

    (!parts.is_empty()).then(|| format!("Current system status: {}", parts.join(", ")))
}
