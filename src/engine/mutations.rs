use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::policy::{auto_approves, Action};

use super::conflict::{check_no_conflict, now_ms, validate_request, validate_resource};
use super::{visible_to, Engine, EngineError, WalCommand};

impl Engine {
    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(
        &self,
        principal: &Principal,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        self.authorize(principal, Action::CreateBooking, true)?;
        let window = validate_request(&request)?;

        let resource_id = request.resource_id;
        let unknown = || EngineError::invalid("resource_id", format!("unknown resource {resource_id}"));
        if self.store.get_resource(&resource_id).is_none() {
            return Err(unknown());
        }

        let scope = self.write_scope(resource_id);
        let _guard = scope.lock().await;

        let resource = self.store.get_resource(&resource_id).ok_or_else(unknown)?;
        if resource.status != ResourceStatus::Available {
            return Err(EngineError::ResourceUnavailable {
                id: resource_id,
                status: resource.status,
            });
        }

        let existing = self.store.list_by_resource(&resource_id);
        if existing.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        if let Err(e) = check_no_conflict(&existing, request.date, &window) {
            metrics::counter!(crate::observability::SLOT_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let status = if auto_approves(principal.role) {
            BookingStatus::Approved
        } else {
            BookingStatus::Pending
        };
        let booking = Booking {
            id: Ulid::new(),
            resource_id,
            requester_id: principal.id.clone(),
            requester_name: principal.name.clone(),
            requester_role: principal.role,
            title: request.title.trim().to_string(),
            description: request.description,
            date: request.date,
            window,
            status,
            created_at: now_ms(),
        };

        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&event).await?;
        metrics::counter!(
            crate::observability::BOOKINGS_CREATED_TOTAL,
            "status" => status.as_str()
        )
        .increment(1);
        info!(
            "booking {} on {} {} {} by {} ({status})",
            booking.id, resource_id, booking.date, booking.window, principal.id
        );
        Ok(booking)
    }

    /// Approve or reject a pending booking.
    pub async fn transition_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
        new_status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        self.authorize(principal, Action::ApproveOrReject, false)?;
        let resource_id = self
            .store
            .get_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .resource_id;

        let scope = self.write_scope(resource_id);
        let _guard = scope.lock().await;
        let booking = self
            .store
            .get_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let updated = self.commit_transition(booking, new_status).await?;
        info!("booking {booking_id} {new_status} by {}", principal.id);
        Ok(updated)
    }

    /// Requester takes back their own pending booking, freeing its slot.
    pub async fn withdraw_booking(
        &self,
        principal: &Principal,
        booking_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .get_booking(&booking_id)
            .filter(|b| visible_to(principal, b))
            .ok_or(EngineError::NotFound(booking_id))?;
        let is_owner = booking.requester_id == principal.id;
        self.authorize(principal, Action::WithdrawOwnBooking, is_owner)?;

        let scope = self.write_scope(booking.resource_id);
        let _guard = scope.lock().await;
        let booking = self
            .store
            .get_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let updated = self.commit_transition(booking, BookingStatus::Rejected).await?;
        info!("booking {booking_id} withdrawn by {}", principal.id);
        Ok(updated)
    }

    /// Caller holds the booking's resource write scope.
    async fn commit_transition(
        &self,
        mut booking: Booking,
        to: BookingStatus,
    ) -> Result<Booking, EngineError> {
        if booking.status.is_terminal() || to == BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id: booking.id,
                from: booking.status,
                to,
            });
        }
        let event = Event::BookingStatusChanged {
            id: booking.id,
            resource_id: booking.resource_id,
            status: to,
        };
        self.persist_and_apply(&event).await?;
        booking.status = to;
        Ok(booking)
    }

    // ── Resources ────────────────────────────────────────────

    pub async fn create_resource(
        &self,
        principal: &Principal,
        spec: ResourceSpec,
    ) -> Result<Resource, EngineError> {
        self.authorize(principal, Action::CreateResource, false)?;
        let mut resource = Resource {
            id: Ulid::new(),
            name: spec.name,
            kind: spec.kind,
            capacity: spec.capacity,
            location: spec.location,
            status: ResourceStatus::Available,
            features: spec.features,
        };
        validate_resource(&mut resource)?;

        let _catalog = self.catalog_scope.lock().await;
        if self.store.resource_count() >= self.max_resources {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        let event = Event::ResourceCreated { resource: resource.clone() };
        self.persist_and_apply(&event).await?;
        info!("resource {} ({}) created by {}", resource.id, resource.name, principal.id);
        Ok(resource)
    }

    /// Edit descriptive fields. Status has its own operation.
    pub async fn update_resource(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: ResourcePatch,
    ) -> Result<Resource, EngineError> {
        self.authorize(principal, Action::EditResource, false)?;
        if patch.is_empty() {
            return Err(EngineError::invalid("resource", "no fields to update"));
        }
        if self.store.get_resource(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let scope = self.write_scope(id);
        let _guard = scope.lock().await;
        let mut resource = self.store.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        if let Some(name) = patch.name {
            resource.name = name;
        }
        if let Some(kind) = patch.kind {
            resource.kind = kind;
        }
        if let Some(capacity) = patch.capacity {
            resource.capacity = capacity;
        }
        if let Some(location) = patch.location {
            resource.location = location;
        }
        if let Some(features) = patch.features {
            resource.features = features;
        }
        validate_resource(&mut resource)?;

        let event = Event::ResourceUpdated { resource: resource.clone() };
        self.persist_and_apply(&event).await?;
        Ok(resource)
    }

    /// Existing bookings are untouched: approved bookings on a resource
    /// entering maintenance stay approved.
    pub async fn set_resource_status(
        &self,
        principal: &Principal,
        id: Ulid,
        status: ResourceStatus,
    ) -> Result<Resource, EngineError> {
        self.authorize(principal, Action::ManageResourceStatus, false)?;
        if self.store.get_resource(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let scope = self.write_scope(id);
        let _guard = scope.lock().await;
        let mut resource = self.store.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        if resource.status == status {
            return Ok(resource);
        }

        let event = Event::ResourceStatusChanged { id, status };
        self.persist_and_apply(&event).await?;
        info!("resource {id} {} -> {status} by {}", resource.status, principal.id);
        resource.status = status;
        Ok(resource)
    }

    pub async fn delete_resource(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        self.authorize(principal, Action::DeleteResource, false)?;
        if self.store.get_resource(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let scope = self.write_scope(id);
        let guard = scope.lock().await;
        if self.store.get_resource(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        if let Some(active) = self
            .store
            .list_by_resource(&id)
            .into_iter()
            .find(|b| b.status.reserves_slot())
        {
            return Err(EngineError::ResourceInUse { id, booking: active.id });
        }

        self.persist_and_apply(&Event::ResourceDeleted { id }).await?;
        drop(guard);
        self.drop_write_scope(&id);
        info!("resource {id} deleted by {}", principal.id);
        Ok(())
    }

    /// Create `specs` as `principal` when the catalog is still empty.
    /// Returns how many resources were created.
    pub async fn seed_catalog(
        &self,
        principal: &Principal,
        specs: Vec<ResourceSpec>,
    ) -> Result<usize, EngineError> {
        self.authorize(principal, Action::CreateResource, false)?;
        if !self.store.list_resources().is_empty() {
            tracing::debug!("catalog not empty, skipping seed");
            return Ok(0);
        }
        let count = specs.len();
        for spec in specs {
            self.create_resource(principal, spec).await?;
        }
        info!("seeded catalog with {count} resources");
        Ok(count)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .store
            .list_resources()
            .into_iter()
            .map(|resource| Event::ResourceCreated { resource })
            .collect();
        events.extend(
            self.store
                .list_all()
                .into_iter()
                .map(|booking| Event::BookingCreated { booking }),
        );
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
