use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for record timestamps.
pub type Ms = i64;

// ── Identity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Lecturer,
    Student,
    Maintenance,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Lecturer, Role::Student, Role::Maintenance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Lecturer => "lecturer",
            Role::Student => "student",
            Role::Maintenance => "maintenance",
        }
    }
}

/// The authenticated actor of an operation. Always passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub department: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            name: name.into(),
            department: None,
        }
    }
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Classroom,
    Lab,
    Projector,
    Computer,
    EventSpace,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Classroom => "classroom",
            ResourceType::Lab => "lab",
            ResourceType::Projector => "projector",
            ResourceType::Computer => "computer",
            ResourceType::EventSpace => "event-space",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceStatus {
    Available,
    InUse,
    Maintenance,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "available",
            ResourceStatus::InUse => "in-use",
            ResourceStatus::Maintenance => "maintenance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceType,
    /// Seats or units; `None` for equipment without a meaningful capacity.
    pub capacity: Option<u32>,
    pub location: String,
    pub status: ResourceStatus,
    /// Sorted and deduplicated.
    pub features: Vec<String>,
}

/// Caller-supplied fields of a new resource. Status always starts `available`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    #[serde(default)]
    pub capacity: Option<u32>,
    pub location: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Partial edit of a resource's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePatch {
    pub name: Option<String>,
    pub kind: Option<ResourceType>,
    /// `Some(None)` clears the capacity.
    pub capacity: Option<Option<u32>>,
    pub location: Option<String>,
    pub features: Option<Vec<String>>,
}

impl ResourcePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.kind.is_none()
            && self.capacity.is_none()
            && self.location.is_none()
            && self.features.is_none()
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
        }
    }

    /// Pending and approved bookings hold their slot.
    pub fn reserves_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

/// Half-open wall-clock window `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    /// Returns `None` unless `start < end`.
    pub fn checked(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_time(self.start), format_time(self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub requester_id: String,
    /// Snapshot taken at creation; never re-derived from the directory.
    pub requester_name: String,
    pub requester_role: Role,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub status: BookingStatus,
    pub created_at: Ms,
}

/// Caller-supplied fields of a booking request. Times are validated by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: Ulid,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

// ── Query filters ────────────────────────────────────────────────

/// Filters narrow the caller's visible set; they never widen it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    /// Case-insensitive substring of title or requester name.
    pub search: Option<String>,
    pub resource_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        if self.status.is_some_and(|s| s != booking.status) {
            return false;
        }
        if self.resource_id.is_some_and(|r| r != booking.resource_id) {
            return false;
        }
        if self.date.is_some_and(|d| d != booking.date) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                booking.title.to_lowercase().contains(&term)
                    || booking.requester_name.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub kind: Option<ResourceType>,
    pub status: Option<ResourceStatus>,
    /// Case-insensitive substring of name or location.
    pub search: Option<String>,
}

impl ResourceFilter {
    pub fn matches(&self, resource: &Resource) -> bool {
        if self.kind.is_some_and(|k| k != resource.kind) {
            return false;
        }
        if self.status.is_some_and(|s| s != resource.status) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                resource.name.to_lowercase().contains(&term)
                    || resource.location.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

// ── WAL record format ────────────────────────────────────────────

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        resource: Resource,
    },
    ResourceUpdated {
        resource: Resource,
    },
    ResourceStatusChanged {
        id: Ulid,
        status: ResourceStatus,
    },
    ResourceDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: BookingStatus,
    },
}

// ── Text forms ───────────────────────────────────────────────────

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "lecturer" => Ok(Role::Lecturer),
            "student" => Ok(Role::Student),
            "maintenance" => Ok(Role::Maintenance),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classroom" => Ok(ResourceType::Classroom),
            "lab" => Ok(ResourceType::Lab),
            "projector" => Ok(ResourceType::Projector),
            "computer" => Ok(ResourceType::Computer),
            "event-space" | "event_space" => Ok(ResourceType::EventSpace),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(ResourceStatus::Available),
            "in-use" | "in_use" => Ok(ResourceStatus::InUse),
            "maintenance" => Ok(ResourceStatus::Maintenance),
            other => Err(format!("unknown resource status: {other}")),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("bad date {s:?}: {e}"))
}

/// `HH:MM` or `HH:MM:SS`.
pub fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("bad time {s:?}: {e}"))
}

/// `HH:MM`, with seconds only when non-zero.
pub fn format_time(t: NaiveTime) -> String {
    use chrono::Timelike;
    if t.second() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}

/// RFC 3339 rendering of a millisecond timestamp.
pub fn format_ms(ms: Ms) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}
