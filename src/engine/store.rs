use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// Repository of `Resource` records.
pub trait ResourceCatalog: Send + Sync {
    fn get_resource(&self, id: &Ulid) -> Option<Resource>;
    /// All resources in creation order.
    fn list_resources(&self) -> Vec<Resource>;
    fn save_resource(&self, resource: Resource);
    fn remove_resource(&self, id: &Ulid) -> Option<Resource>;
    fn resource_count(&self) -> usize;
}

/// Repository of `Booking` records. Saving an existing id replaces it in place.
pub trait BookingLedger: Send + Sync {
    fn get_booking(&self, id: &Ulid) -> Option<Booking>;
    /// Bookings of one resource in ledger order.
    fn list_by_resource(&self, resource_id: &Ulid) -> Vec<Booking>;
    /// All bookings in ledger order.
    fn list_all(&self) -> Vec<Booking>;
    fn save_booking(&self, booking: Booking);
    fn booking_count(&self) -> usize;
}

/// Both repositories behind one handle.
pub trait Store: ResourceCatalog + BookingLedger {}

impl<T: ResourceCatalog + BookingLedger> Store for T {}

struct Sequenced<T> {
    seq: u64,
    record: T,
}

pub struct InMemoryStore {
    resources: DashMap<Ulid, Sequenced<Resource>>,
    bookings: DashMap<Ulid, Sequenced<Booking>>,
    /// Resource id → its booking ids in ledger order.
    by_resource: DashMap<Ulid, Vec<Ulid>>,
    next_seq: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            bookings: DashMap::new(),
            by_resource: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

// ── Resource catalog ─────────────────────────────────────────

impl ResourceCatalog for InMemoryStore {
    fn get_resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.get(id).map(|e| e.record.clone())
    }

    fn list_resources(&self) -> Vec<Resource> {
        let mut all: Vec<(u64, Resource)> = self
            .resources
            .iter()
            .map(|e| (e.seq, e.record.clone()))
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, r)| r).collect()
    }

    fn save_resource(&self, resource: Resource) {
        if let Some(mut existing) = self.resources.get_mut(&resource.id) {
            existing.record = resource;
            return;
        }
        let seq = self.seq();
        self.resources.insert(resource.id, Sequenced { seq, record: resource });
    }

    fn remove_resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.remove(id).map(|(_, e)| e.record)
    }

    fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

// ── Booking ledger ───────────────────────────────────────────

impl BookingLedger for InMemoryStore {
    fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.record.clone())
    }

    fn list_by_resource(&self, resource_id: &Ulid) -> Vec<Booking> {
        let ids = self
            .by_resource
            .get(resource_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get_booking(id)).collect()
    }

    fn list_all(&self) -> Vec<Booking> {
        let mut all: Vec<(u64, Booking)> = self
            .bookings
            .iter()
            .map(|e| (e.seq, e.record.clone()))
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, b)| b).collect()
    }

    fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    fn save_booking(&self, booking: Booking) {
        if let Some(mut existing) = self.bookings.get_mut(&booking.id) {
            existing.record = booking;
            return;
        }
        let (id, resource_id) = (booking.id, booking.resource_id);
        let seq = self.seq();
        self.bookings.insert(id, Sequenced { seq, record: booking });
        self.by_resource.entry(resource_id).or_default().push(id);
    }
}

// ── Event application ────────────────────────────────────────

/// Apply one WAL event. Used both for live writes and for replay.
pub fn apply_event(store: &dyn Store, event: &Event) {
    match event {
        Event::ResourceCreated { resource } | Event::ResourceUpdated { resource } => {
            store.save_resource(resource.clone());
        }
        Event::ResourceStatusChanged { id, status } => {
            if let Some(mut resource) = store.get_resource(id) {
                resource.status = *status;
                store.save_resource(resource);
            }
        }
        Event::ResourceDeleted { id } => {
            store.remove_resource(id);
        }
        Event::BookingCreated { booking } => {
            store.save_booking(booking.clone());
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(mut booking) = store.get_booking(id) {
                booking.status = *status;
                store.save_booking(booking);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str) -> Resource {
        Resource {
            id: Ulid::new(),
            name: name.into(),
            kind: ResourceType::Classroom,
            capacity: Some(30),
            location: "Building A".into(),
            status: ResourceStatus::Available,
            features: vec![],
        }
    }

    fn booking(resource_id: Ulid, title: &str) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id,
            requester_id: "u".into(),
            requester_name: "U".into(),
            requester_role: Role::Student,
            title: title.into(),
            description: String::new(),
            date: parse_date("2024-07-22").unwrap(),
            window: TimeWindow::new(parse_time("09:00").unwrap(), parse_time("10:00").unwrap()),
            status: BookingStatus::Pending,
            created_at: 0,
        }
    }

    #[test]
    fn ledger_preserves_insertion_order() {
        let store = InMemoryStore::new();
        let r1 = resource("A");
        let r2 = resource("B");
        let titles = ["first", "second", "third", "fourth"];
        for (i, t) in titles.iter().enumerate() {
            let rid = if i % 2 == 0 { r1.id } else { r2.id };
            store.save_booking(booking(rid, t));
        }
        let all: Vec<String> = store.list_all().into_iter().map(|b| b.title).collect();
        assert_eq!(all, titles);
        let r1_titles: Vec<String> =
            store.list_by_resource(&r1.id).into_iter().map(|b| b.title).collect();
        assert_eq!(r1_titles, ["first", "third"]);
    }

    #[test]
    fn saving_existing_booking_keeps_position() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        let a = booking(rid, "a");
        let b = booking(rid, "b");
        store.save_booking(a.clone());
        store.save_booking(b);
        store.save_booking(Booking { status: BookingStatus::Approved, ..a.clone() });

        let all = store.list_all();
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].status, BookingStatus::Approved);
        assert_eq!(store.list_by_resource(&rid).len(), 2);
        assert_eq!(store.booking_count(), 2);
    }

    #[test]
    fn catalog_lists_in_creation_order() {
        let store = InMemoryStore::new();
        let names = ["Hall", "Lab", "Projector"];
        for n in names {
            store.save_resource(resource(n));
        }
        let listed: Vec<String> = store.list_resources().into_iter().map(|r| r.name).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn apply_status_events() {
        let store = InMemoryStore::new();
        let r = resource("Hall");
        apply_event(&store, &Event::ResourceCreated { resource: r.clone() });
        apply_event(&store, &Event::ResourceStatusChanged {
            id: r.id,
            status: ResourceStatus::Maintenance,
        });
        assert_eq!(store.get_resource(&r.id).unwrap().status, ResourceStatus::Maintenance);

        let b = booking(r.id, "x");
        apply_event(&store, &Event::BookingCreated { booking: b.clone() });
        apply_event(&store, &Event::BookingStatusChanged {
            id: b.id,
            resource_id: r.id,
            status: BookingStatus::Rejected,
        });
        assert_eq!(store.get_booking(&b.id).unwrap().status, BookingStatus::Rejected);

        apply_event(&store, &Event::ResourceDeleted { id: r.id });
        assert!(store.get_resource(&r.id).is_none());
        assert_eq!(store.resource_count(), 0);
    }
}
