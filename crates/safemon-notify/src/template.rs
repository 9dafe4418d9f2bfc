//! Deterministic HTML message rendering for Telegram's `parse_mode = HTML`.

use safemon_common::types::{FlagTransitionEvent, ScanCycleResult};
use std::fmt::Write;

pub const TEST_MESSAGE: &str = "✅ <b>Telegram Integration Active</b>\n\nYour Domain Safety Monitor is connected and ready to send alerts!";

/// Escapes the characters Telegram's HTML parser treats as markup.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// One alert covering the whole batch of newly flagged domains.
pub fn format_flagged_alert(events: &[FlagTransitionEvent], dashboard_url: Option<&str>) -> String {
    let count = events.len();
    let plural = if count == 1 { "domain has" } else { "domains have" };

    let mut msg = String::from("🚨 <b>SECURITY ALERT</b> 🚨\n\n");
    let _ = write!(msg, "<b>{count} {plural} been flagged by Google Safe Browsing!</b>\n\n");

    for (i, event) in events.iter().enumerate() {
        let _ = writeln!(msg, "{}. <b>{}</b>", i + 1, escape_html(&event.domain));
        if let Some(category) = event.category.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(msg, "   📁 Category: {}", escape_html(category));
        }
        if !event.threats.is_empty() {
            let threats: Vec<String> = event.threats.iter().map(|t| escape_html(t)).collect();
            let _ = writeln!(msg, "   ⚠️ Threats: {}", threats.join(", "));
        }
        let _ = writeln!(
            msg,
            "   🕐 Detected: {}",
            event.detected_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        msg.push('\n');
    }

    if let Some(url) = dashboard_url.filter(|u| !u.is_empty()) {
        let _ = write!(msg, "🔗 <a href=\"{}\">View Dashboard</a>\n\n", escape_html(url));
    }
    msg.push_str("<i>Automated alert from Domain Safety Monitor</i>");
    msg
}

pub fn format_scan_summary(cycle: &ScanCycleResult) -> String {
    let mut msg = String::from("📊 <b>Scan Complete</b>\n\n");
    let _ = writeln!(msg, "✅ Safe: {}", cycle.safe);
    let _ = writeln!(msg, "🚨 Flagged: {}", cycle.flagged);
    let _ = writeln!(msg, "📋 Total Scanned: {}", cycle.scanned);
    if cycle.new_flags > 0 {
        let _ = write!(msg, "\n⚠️ <b>{} NEW FLAG(S) DETECTED!</b>", cycle.new_flags);
    }
    msg
}
