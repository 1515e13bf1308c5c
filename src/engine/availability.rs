use chrono::NaiveDate;

use crate::model::*;

// ── Free-window computation ──────────────────────────────────────

/// Sub-windows of `bounds` on `date` not held by any slot-reserving booking.
/// `bookings` are those of a single resource, in any order.
pub fn free_windows(bookings: &[Booking], date: NaiveDate, bounds: &TimeWindow) -> Vec<TimeWindow> {
    let mut taken: Vec<TimeWindow> = bookings
        .iter()
        .filter(|b| b.status.reserves_slot() && b.date == date && b.window.overlaps(bounds))
        .map(|b| b.window)
        .collect();
    taken.sort_by_key(|w| w.start);
    let taken = merge_overlapping(&taken);
    subtract_windows(&[*bounds], &taken)
}

/// Merge sorted overlapping/adjacent windows into disjoint windows.
pub fn merge_overlapping(sorted: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut merged: Vec<TimeWindow> = Vec::new();
    for &window in sorted {
        if let Some(last) = merged.last_mut()
            && window.start <= last.end {
                last.end = last.end.max(window.end);
                continue;
            }
        merged.push(window);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` windows from sorted, disjoint `base` windows.
pub fn subtract_windows(base: &[TimeWindow], to_remove: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeWindow::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeWindow::new(current_start, current_end));
        }
    }

    result
}
