//! View models handed to callers after normalization.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use time::{Date, Time};

use super::calendar::{serialize_optional_date, serialize_optional_time};
use super::error::DomainError;
use super::types::AppointmentStatus;

/// Shown when an appointment's client reference cannot be resolved.
pub const UNKNOWN_CLIENT_NAME: &str = "Cliente desconocido";
/// Dashboard fallback for an upcoming appointment without a client name.
pub const UNNAMED_CLIENT: &str = "Cliente sin nombre";
/// Dashboard fallback for an upcoming appointment without a client phone.
pub const MISSING_PHONE: &str = "Sin teléfono";

/// Numeric primary key of a backend row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("identifier must not be empty"));
        }
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|_| DomainError::validation(format!("identifier `{value}` is not numeric")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: String,
}

/// `date`, `time` and `status` are `None` when the row left them empty; they
/// serialize as `""` in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: String,
    #[serde(serialize_with = "serialize_optional_date")]
    pub date: Option<Date>,
    #[serde(serialize_with = "serialize_optional_time")]
    pub time: Option<Time>,
    pub client_id: String,
    /// Resolved by join at fetch time; never persisted.
    pub client_name: String,
    #[serde(serialize_with = "serialize_optional_status")]
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingAppointment {
    pub id: String,
    #[serde(serialize_with = "serialize_optional_date")]
    pub date: Option<Date>,
    #[serde(serialize_with = "serialize_optional_time")]
    pub time: Option<Time>,
    pub client_name: String,
    pub client_phone: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_appointments: u64,
    pub total_clients: u64,
    pub pending_appointments: u64,
    pub completed_appointments: u64,
}

fn serialize_optional_status<S: Serializer>(
    status: &Option<AppointmentStatus>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(status.map(AppointmentStatus::as_str).unwrap_or_default())
}
