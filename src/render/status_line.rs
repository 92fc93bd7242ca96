// Status Line
// Terminal rendering of sync status transitions

use crossterm::style::{Color, Stylize};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::watch;

use crate::core::settings::{NotificationLevel, Settings};
use crate::core::status::{StatusSnapshot, SyncStatus};
use crate::core::{SubscriptionId, VaultSync};

/// Glyph and color per status
pub fn status_style(status: SyncStatus) -> (&'static str, Color) {
    match status {
        SyncStatus::Idle => ("●", Color::Green),
        SyncStatus::Syncing => ("↻", Color::Cyan),
        SyncStatus::Error => ("✗", Color::Red),
        SyncStatus::Offline => ("○", Color::Yellow),
    }
}

/// Whether a transition is reported at this verbosity
pub fn should_report(level: NotificationLevel, status: SyncStatus) -> bool {
    match level {
        NotificationLevel::All => true,
        NotificationLevel::Errors => status.is_sticky(),
        NotificationLevel::None => false,
    }
}

/// Unstyled status line, e.g. `idle  Synced 2 operation(s)  (last sync 14:02:11)`
pub fn format_status_line(snapshot: &StatusSnapshot) -> String {
    let mut line = format!("{:<8}", snapshot.status.as_str());

    if let Some(message) = &snapshot.message {
        line.push_str(message);
    }
    if let Some(last) = snapshot.last_sync {
        let local = last.with_timezone(&chrono::Local);
        line.push_str(&format!("  (last sync {})", local.format("%H:%M:%S")));
    }

    line.trim_end().to_string()
}

/// Write one styled status line
pub fn render_status_line(out: &mut impl Write, snapshot: &StatusSnapshot) -> io::Result<()> {
    let (glyph, color) = status_style(snapshot.status);
    writeln!(out, "{} {}", glyph.with(color).bold(), format_status_line(snapshot))
}

/// Print transitions to stdout, honoring the live notification setting
pub fn attach(service: &VaultSync) -> SubscriptionId {
    let settings: watch::Receiver<Arc<Settings>> = service.settings_receiver();

    service.subscribe(move |snapshot| {
        let level = settings.borrow().notifications;
        if !should_report(level, snapshot.status) {
            return;
        }
        // A closed stdout is not worth failing a sync over
        let _ = render_status_line(&mut io::stdout().lock(), snapshot);
    })
}
