//! Heartbeat: periodic protocol-level ping while the session stays open.
//! Liveness is judged by the session's own close/error events, not by ping
//! replies; the monitor's job is to keep probe traffic flowing and to go
//! away the moment the session does.

use std::time::Duration;

use tokio::sync::watch;

use crate::session::Session;

/// Probe interval while the session is open.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Run the monitor until the session closes or `stop` flips. Exits promptly
/// on either; never blocks the connection manager's transitions.
pub async fn run_monitor(session: Session, interval: Duration, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {
                if session.ping().is_err() {
                    break;
                }
            }
        }
    }
}
