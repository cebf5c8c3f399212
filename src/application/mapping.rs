//! Normalization of raw backend rows into view models.
//!
//! Absent or `null` columns fall back to `""` (or `None` for the typed date,
//! time and status). Shape errors fail the whole batch: a row without an id,
//! a non-scalar column, or text that does not parse. A list is either fully
//! mapped or not returned at all.

use serde_json::Value;
use time::{Date, Time};

use crate::application::error::DataError;
use crate::application::repos::RawRecord;
use crate::domain::calendar::{parse_date, parse_time};
use crate::domain::entities::{
    Appointment, Client, MISSING_PHONE, UNKNOWN_CLIENT_NAME, UNNAMED_CLIENT, UpcomingAppointment,
};
use crate::domain::error::DomainError;
use crate::domain::types::{AppointmentStatus, Table};

/// Column under which the joined client row is embedded.
pub(crate) const CLIENT_EMBED: &str = "clients";

pub fn map_clients(rows: Vec<RawRecord>) -> Result<Vec<Client>, DataError> {
    rows.iter().map(map_client).collect()
}

pub fn map_client(row: &RawRecord) -> Result<Client, DataError> {
    let table = Table::Clients;
    Ok(Client {
        id: required_id(table, row, "id")?,
        name: text(table, row, "name")?,
        email: text(table, row, "email")?,
        phone: text(table, row, "phone")?,
        notes: text(table, row, "notes")?,
    })
}

pub fn map_appointments(rows: Vec<RawRecord>) -> Result<Vec<Appointment>, DataError> {
    rows.iter().map(map_appointment).collect()
}

pub fn map_appointment(row: &RawRecord) -> Result<Appointment, DataError> {
    let table = Table::Appointments;
    let id = required_id(table, row, "id")?;
    let status = optional_column(table, row, "status", &id, |value| {
        value.parse::<AppointmentStatus>()
    })?;

    Ok(Appointment {
        date: date_column(table, row, &id)?,
        time: time_column(table, row, &id)?,
        client_id: text(table, row, "client_id")?,
        client_name: embedded_text(table, row, "name")?
            .unwrap_or_else(|| UNKNOWN_CLIENT_NAME.to_string()),
        status,
        id,
    })
}

pub fn map_upcoming(rows: Vec<RawRecord>) -> Result<Vec<UpcomingAppointment>, DataError> {
    let table = Table::Appointments;
    rows.iter()
        .map(|row| {
            let id = required_id(table, row, "id")?;
            Ok(UpcomingAppointment {
                date: date_column(table, row, &id)?,
                time: time_column(table, row, &id)?,
                client_name: embedded_text(table, row, "name")?
                    .unwrap_or_else(|| UNNAMED_CLIENT.to_string()),
                client_phone: embedded_text(table, row, "phone")?
                    .unwrap_or_else(|| MISSING_PHONE.to_string()),
                id,
            })
        })
        .collect()
}

fn required_id(table: Table, row: &RawRecord, column: &'static str) -> Result<String, DataError> {
    let value = text(table, row, column)?;
    if value.is_empty() {
        return Err(DataError::malformed(
            table,
            format!("missing `{column}` column"),
        ));
    }
    Ok(value)
}

fn date_column(table: Table, row: &RawRecord, id: &str) -> Result<Option<Date>, DataError> {
    optional_column(table, row, "date", id, parse_date)
}

fn time_column(table: Table, row: &RawRecord, id: &str) -> Result<Option<Time>, DataError> {
    optional_column(table, row, "time", id, parse_time)
}

/// Typed column that may be left empty: absent, `null` and `""` map to `None`,
/// any other text must parse.
fn optional_column<T>(
    table: Table,
    row: &RawRecord,
    column: &'static str,
    id: &str,
    parse: impl FnOnce(&str) -> Result<T, DomainError>,
) -> Result<Option<T>, DataError> {
    let value = text(table, row, column)?;
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse(&value)
        .map(Some)
        .map_err(|err| DataError::malformed(table, format!("row {id}: {err}")))
}

/// Scalar column as text; absent or `null` becomes `""`.
fn text(table: Table, row: &RawRecord, column: &'static str) -> Result<String, DataError> {
    scalar_text(row.get(column)).ok_or_else(|| {
        DataError::malformed(table, format!("column `{column}` is not a scalar"))
    })
}

/// Column of the embedded client row; `None` when the join found no row or
/// the value is empty.
fn embedded_text(
    table: Table,
    row: &RawRecord,
    column: &'static str,
) -> Result<Option<String>, DataError> {
    let joined = match row.get(CLIENT_EMBED) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(joined)) => joined,
        Some(_) => {
            return Err(DataError::malformed(
                table,
                format!("embedded `{CLIENT_EMBED}` is not an object"),
            ));
        }
    };

    let value = scalar_text(joined.get(column)).ok_or_else(|| {
        DataError::malformed(
            table,
            format!("embedded `{CLIENT_EMBED}.{column}` is not a scalar"),
        )
    })?;
    Ok((!value.is_empty()).then_some(value))
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        Some(Value::Array(_) | Value::Object(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn client_nulls_become_empty_strings() {
        let client = map_client(&row(json!({
            "id": 12,
            "name": "Ana",
            "email": null,
            "created_at": "2024-01-01T00:00:00Z"
        })))
        .expect("maps");

        assert_eq!(client.id, "12");
        assert_eq!(client.name, "Ana");
        assert_eq!(client.email, "");
        assert_eq!(client.phone, "");
        assert_eq!(client.notes, "");
    }

    #[test]
    fn client_without_id_is_malformed() {
        let error = map_clients(vec![
            row(json!({"id": 1, "name": "ok"})),
            row(json!({"name": "no id"})),
        ])
        .expect_err("batch fails");
        assert!(matches!(
            error,
            DataError::Malformed {
                table: Table::Clients,
                ..
            }
        ));
    }

    #[test]
    fn appointment_resolves_joined_client_name() {
        let appointment = map_appointment(&row(json!({
            "id": 5,
            "date": "2024-06-01",
            "time": "10:00:00",
            "client_id": 3,
            "status": "confirmado",
            "clients": {"name": "Juan Pérez"}
        })))
        .expect("maps");

        assert_eq!(appointment.id, "5");
        assert_eq!(appointment.client_id, "3");
        assert_eq!(appointment.client_name, "Juan Pérez");
        assert_eq!(appointment.status, Some(AppointmentStatus::Confirmed));
    }

    #[test]
    fn missing_join_falls_back_to_sentinel() {
        for joined in [json!(null), json!({"name": null}), json!({"name": ""})] {
            let appointment = map_appointment(&row(json!({
                "id": 5,
                "date": "2024-06-01",
                "time": "10:00",
                "client_id": 77,
                "status": "pendiente",
                "clients": joined
            })))
            .expect("maps");
            assert_eq!(appointment.client_name, UNKNOWN_CLIENT_NAME);
        }

        let without_embed = map_appointment(&row(json!({
            "id": 6,
            "date": "2024-06-01",
            "time": "10:00",
            "client_id": null,
            "status": "pendiente"
        })))
        .expect("maps");
        assert_eq!(without_embed.client_id, "");
        assert_eq!(without_embed.client_name, UNKNOWN_CLIENT_NAME);
    }

    #[test]
    fn empty_typed_columns_map_to_none() {
        let appointments = map_appointments(vec![
            row(json!({
                "id": 1,
                "date": "2024-06-01",
                "time": "10:00",
                "status": "pendiente"
            })),
            row(json!({"id": 2, "date": null, "time": "", "client_id": 4})),
        ])
        .expect("nulls are not shape errors");

        assert_eq!(appointments.len(), 2);
        assert!(appointments[0].date.is_some());
        assert_eq!(appointments[1].date, None);
        assert_eq!(appointments[1].time, None);
        assert_eq!(appointments[1].status, None);
        assert_eq!(appointments[1].client_id, "4");
    }

    #[test]
    fn unparseable_date_fails_the_read() {
        let error = map_appointments(vec![row(json!({
            "id": 1,
            "date": "01/06/2024",
            "time": "10:00",
            "status": "pendiente"
        }))])
        .expect_err("bad date");
        assert_eq!(error.kind(), "malformed");
    }

    #[test]
    fn unknown_status_fails_the_read() {
        let error = map_appointments(vec![row(json!({
            "id": 1,
            "date": "2024-06-01",
            "time": "10:00",
            "status": "completada"
        }))])
        .expect_err("unknown status");
        assert!(error.to_string().contains("completada"));
    }

    #[test]
    fn embedded_value_must_be_an_object() {
        let error = map_appointment(&row(json!({
            "id": 1,
            "date": "2024-06-01",
            "time": "10:00",
            "status": "pendiente",
            "clients": ["Juan"]
        })))
        .expect_err("array embed");
        assert_eq!(error.kind(), "malformed");
    }

    #[test]
    fn upcoming_uses_dashboard_fallbacks() {
        let upcoming = map_upcoming(vec![row(json!({
            "id": 9,
            "date": "2030-01-02",
            "time": "08:15:00",
            "status": "pendiente",
            "clients": {"name": "Lucía", "phone": null}
        }))])
        .expect("maps");

        assert_eq!(upcoming[0].client_name, "Lucía");
        assert_eq!(upcoming[0].client_phone, MISSING_PHONE);
    }
}
