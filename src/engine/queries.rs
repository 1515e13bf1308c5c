use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_SEARCH_LEN;
use crate::model::*;

use super::availability::free_windows;
use super::{visible_to, Engine, EngineError};

fn check_search(search: &Option<String>) -> Result<(), EngineError> {
    match search {
        Some(term) if term.len() > MAX_SEARCH_LEN => {
            Err(EngineError::LimitExceeded("search term too long"))
        }
        _ => Ok(()),
    }
}

impl Engine {
    /// Bookings visible to `principal`, narrowed by `filter`, in ledger order.
    ///
    /// Visibility is applied first, so no combination of filters can reach
    /// another requester's bookings for a caller limited to their own.
    pub fn list_bookings(
        &self,
        principal: &Principal,
        filter: &BookingFilter,
    ) -> Result<Vec<Booking>, EngineError> {
        check_search(&filter.search)?;
        let source = match filter.resource_id {
            Some(rid) => self.store.list_by_resource(&rid),
            None => self.store.list_all(),
        };
        Ok(source
            .into_iter()
            .filter(|b| visible_to(principal, b))
            .filter(|b| filter.matches(b))
            .collect())
    }

    /// A booking the caller may see. Hidden bookings are reported as not found.
    pub fn get_booking(&self, principal: &Principal, id: Ulid) -> Result<Booking, EngineError> {
        self.store
            .get_booking(&id)
            .filter(|b| visible_to(principal, b))
            .ok_or(EngineError::NotFound(id))
    }

    /// The catalog is readable by every role.
    pub fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, EngineError> {
        check_search(&filter.search)?;
        Ok(self
            .store
            .list_resources()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    pub fn get_resource(&self, id: Ulid) -> Result<Resource, EngineError> {
        self.store.get_resource(&id).ok_or(EngineError::NotFound(id))
    }

    /// Free sub-windows of `bounds` on `date` for one resource.
    pub fn free_windows(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
        bounds: TimeWindow,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        self.get_resource(resource_id)?;
        let bookings = self.store.list_by_resource(&resource_id);
        Ok(free_windows(&bookings, date, &bounds))
    }

    pub fn resource_count(&self) -> usize {
        self.store.resource_count()
    }

    pub fn booking_count(&self) -> usize {
        self.store.booking_count()
    }
}
