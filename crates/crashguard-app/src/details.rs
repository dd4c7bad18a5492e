//! Error details shown by the recovery surface and copied to bug reports

use std::fmt::Write;

use chrono::{DateTime, Local};

use crashguard_core::HandoffPayload;

use crate::config::AppInfo;

/// Full diagnostic text for `payload`
pub fn describe(payload: &HandoffPayload, app: &AppInfo, now: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Build version: {}", app.version);
    let _ = writeln!(out, "Current date: {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Application: {}", app.name);
    let _ = writeln!(out, "OS: {} ({})", std::env::consts::OS, std::env::consts::FAMILY);
    let _ = writeln!(out, "Arch: {}", std::env::consts::ARCH);
    out.push('\n');
    out.push_str("Stack trace:\n\n");
    out.push_str(&payload.fault_text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_describe() {
        let payload = HandoffPayload {
            restart_target: None,
            show_details: true,
            fault_text: "panic at src/main.rs:3:5: boom".into(),
            icon_id: 0,
        };
        let app = AppInfo {
            name: "my-app".into(),
            version: "2.1.0".into(),
            crash_log: true,
        };
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let text = describe(&payload, &app, now);

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Build version: 2.1.0");
        assert_eq!(lines[1], "Current date: 2024-03-09 14:05:07");
        assert_eq!(lines[2], "Application: my-app");
        assert!(lines[3].starts_with("OS: "));
        assert!(lines[4].starts_with("Arch: "));
        assert!(text.ends_with("Stack trace:\n\npanic at src/main.rs:3:5: boom"));
    }
}
