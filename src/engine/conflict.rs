use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Half-open overlap: windows sharing only a boundary do not conflict.
pub fn overlaps(a: &TimeWindow, b: &TimeWindow) -> bool {
    a.overlaps(b)
}

/// First booking in `existing` that holds a slot overlapping `window` on `date`.
/// Callers pass the bookings of a single resource.
pub fn find_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Booking>,
    date: NaiveDate,
    window: &TimeWindow,
) -> Option<Ulid> {
    existing
        .into_iter()
        .filter(|b| b.status.reserves_slot() && b.date == date)
        .find(|b| overlaps(&b.window, window))
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    existing: &[Booking],
    date: NaiveDate,
    window: &TimeWindow,
) -> Result<(), EngineError> {
    match find_conflict(existing, date, window) {
        Some(id) => Err(EngineError::SlotConflict(id)),
        None => Ok(()),
    }
}

/// Field checks for a booking request; returns the validated window.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<TimeWindow, EngineError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(EngineError::invalid("title", "must not be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if request.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    TimeWindow::checked(request.start, request.end).ok_or_else(|| {
        EngineError::invalid(
            "end_time",
            format!(
                "must be after start_time ({} >= {})",
                format_time(request.start),
                format_time(request.end)
            ),
        )
    })
}

/// Normalizes and checks resource fields shared by create and edit.
pub(crate) fn validate_resource(resource: &mut Resource) -> Result<(), EngineError> {
    resource.name = resource.name.trim().to_string();
    resource.location = resource.location.trim().to_string();
    if resource.name.is_empty() {
        return Err(EngineError::invalid("name", "must not be empty"));
    }
    if resource.location.is_empty() {
        return Err(EngineError::invalid("location", "must not be empty"));
    }
    if resource.name.len() > MAX_NAME_LEN || resource.location.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("resource name or location too long"));
    }
    match resource.capacity {
        Some(0) => return Err(EngineError::invalid("capacity", "must be positive")),
        Some(c) if c > MAX_CAPACITY => return Err(EngineError::LimitExceeded("capacity too large")),
        _ => {}
    }

    let mut features: Vec<String> = resource
        .features
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    features.sort();
    features.dedup();
    if features.len() > MAX_FEATURES {
        return Err(EngineError::LimitExceeded("too many features"));
    }
    if features.iter().any(|f| f.len() > MAX_FEATURE_LEN) {
        return Err(EngineError::LimitExceeded("feature too long"));
    }
    resource.features = features;
    Ok(())
}
