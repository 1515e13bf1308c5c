use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "reservo_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "reservo_query_duration_seconds";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: bookings created. Labels: status (initial status).
pub const BOOKINGS_CREATED_TOTAL: &str = "reservo_bookings_created_total";

/// Counter: booking requests refused because the slot was taken.
pub const SLOT_CONFLICTS_TOTAL: &str = "reservo_slot_conflicts_total";

/// Counter: operations refused by the access policy. Labels: action.
pub const POLICY_DENIALS_TOTAL: &str = "reservo_policy_denials_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "reservo_connections_active";
pub const CONNECTIONS_TOTAL: &str = "reservo_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "reservo_connections_rejected_total";

/// Counter: logins refused for users missing from the directory.
pub const AUTH_FAILURES_TOTAL: &str = "reservo_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "reservo_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "reservo_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is `None`.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBooking(_) => "insert_booking",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::InsertResource(_) => "insert_resource",
        Command::UpdateResourceStatus { .. } => "update_resource_status",
        Command::UpdateResource { .. } => "update_resource",
        Command::DeleteResource { .. } => "delete_resource",
        Command::SelectResources { .. } => "select_resources",
        Command::SelectAvailability { .. } => "select_availability",
    }
}
