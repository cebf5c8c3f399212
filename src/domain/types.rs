//! Shared domain enumerations aligned with the backend wire contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Appointment lifecycle. The serialized values are part of the backend
/// contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "confirmado")]
    Confirmed,
    #[serde(rename = "realizado")]
    Done,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pendiente",
            AppointmentStatus::Confirmed => "confirmado",
            AppointmentStatus::Done => "realizado",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| DomainError::validation(format!("unknown appointment status `{value}`")))
    }
}

/// Backend tables reachable through a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Clients,
    Appointments,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Clients => "clients",
            Table::Appointments => "appointments",
        }
    }

    /// Singular resource name used in error messages.
    pub fn resource(self) -> &'static str {
        match self {
            Table::Clients => "client",
            Table::Appointments => "appointment",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_values_are_spanish_literals() {
        let encoded = serde_json::to_string(&AppointmentStatus::Confirmed).expect("serialize");
        assert_eq!(encoded, "\"confirmado\"");

        let decoded: AppointmentStatus =
            serde_json::from_str("\"realizado\"").expect("deserialize");
        assert_eq!(decoded, AppointmentStatus::Done);
    }

    #[test]
    fn status_parse_rejects_values_outside_the_contract() {
        assert_eq!(
            "pendiente".parse::<AppointmentStatus>().ok(),
            Some(AppointmentStatus::Pending)
        );
        assert!("completada".parse::<AppointmentStatus>().is_err());
        assert!("Pendiente".parse::<AppointmentStatus>().is_err());
    }
}
