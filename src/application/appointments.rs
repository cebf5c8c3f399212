use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use time::{Date, Time};

use crate::application::context::DataContext;
use crate::application::error::DataError;
use crate::application::mapping::{map_appointment, map_appointments};
use crate::application::mutation::{Mutation, MutationOp, Outcome};
use crate::application::repos::{ListQuery, RawRecord, RecordStore};
use crate::cache::{CacheKey, Fetcher, QueryHandle};
use crate::domain::calendar::{format_date, format_time};
use crate::domain::entities::{Appointment, RecordId};
use crate::domain::types::{AppointmentStatus, Table};

const TABLE: Table = Table::Appointments;

/// Input for `add_appointment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    date: Date,
    time: Time,
    client_id: RecordId,
    status: AppointmentStatus,
}

impl NewAppointment {
    pub fn new(
        date: Date,
        time: Time,
        client_id: &str,
        status: AppointmentStatus,
    ) -> Result<Self, DataError> {
        if client_id.trim().is_empty() {
            return Err(DataError::Validation(
                "appointment client_id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            date,
            time,
            client_id: client_id.parse()?,
            status,
        })
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn client_id(&self) -> RecordId {
        self.client_id
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    fn record(&self) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("date".into(), json!(format_date(self.date)));
        record.insert("time".into(), json!(format_time(self.time)));
        record.insert("client_id".into(), json!(self.client_id.get()));
        record.insert("status".into(), json!(self.status.as_str()));
        record
    }
}

/// Input for `update_appointment_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    id: RecordId,
    status: AppointmentStatus,
}

impl StatusChange {
    pub fn new(id: &str, status: AppointmentStatus) -> Result<Self, DataError> {
        Ok(Self {
            id: id.parse()?,
            status,
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }
}

/// Input for `delete_appointment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentId(RecordId);

impl AppointmentId {
    pub fn new(id: &str) -> Result<Self, DataError> {
        Ok(Self(id.parse()?))
    }

    pub fn get(self) -> RecordId {
        self.0
    }
}

fn list_query() -> ListQuery {
    ListQuery::new()
        .order_by("date", true)
        .order_by("time", true)
        .embed(Table::Clients, "client_id", &["name"])
}

/// Backend read behind the `appointments` cache key: chronological, with the
/// client name joined in.
pub(crate) fn fetcher(store: Arc<dyn RecordStore>) -> Fetcher<Vec<Appointment>> {
    Arc::new(move || {
        let store = Arc::clone(&store);
        async move {
            let rows = store
                .list(TABLE, &list_query())
                .await
                .map_err(|err| DataError::from_store(TABLE, None, err))?;
            map_appointments(rows)
        }
        .boxed()
    })
}

/// Inserted rows come back without the joined client, so the returned
/// appointment carries the unknown-client name until the collection refetches.
pub struct AddAppointment;

#[async_trait]
impl MutationOp for AddAppointment {
    type Payload = NewAppointment;
    type Output = Appointment;

    const NAME: &'static str = "add_appointment";
    const KEY: CacheKey = CacheKey::Appointments;
    const OUTCOME: Outcome = Outcome {
        success_title: "Turno creado",
        success_description: "El turno se ha creado exitosamente.",
        failure_description: "No se pudo crear el turno. Inténtalo de nuevo.",
    };

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: NewAppointment,
    ) -> Result<Appointment, DataError> {
        let row = store
            .insert(TABLE, payload.record())
            .await
            .map_err(|err| DataError::from_store(TABLE, None, err))?;
        map_appointment(&row)
    }
}

pub struct UpdateAppointmentStatus;

#[async_trait]
impl MutationOp for UpdateAppointmentStatus {
    type Payload = StatusChange;
    type Output = Appointment;

    const NAME: &'static str = "update_appointment_status";
    const KEY: CacheKey = CacheKey::Appointments;
    const OUTCOME: Outcome = Outcome {
        success_title: "Estado actualizado",
        success_description: "El estado del turno se ha actualizado exitosamente.",
        failure_description: "No se pudo actualizar el estado. Inténtalo de nuevo.",
    };

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: StatusChange,
    ) -> Result<Appointment, DataError> {
        let mut patch = RawRecord::new();
        patch.insert("status".into(), json!(payload.status.as_str()));
        let row = store
            .update(TABLE, payload.id, patch)
            .await
            .map_err(|err| DataError::from_store(TABLE, Some(payload.id), err))?;
        map_appointment(&row)
    }
}

pub struct DeleteAppointment;

#[async_trait]
impl MutationOp for DeleteAppointment {
    type Payload = AppointmentId;
    type Output = ();

    const NAME: &'static str = "delete_appointment";
    const KEY: CacheKey = CacheKey::Appointments;
    const OUTCOME: Outcome = Outcome {
        success_title: "Turno eliminado",
        success_description: "El turno se ha eliminado exitosamente.",
        failure_description: "No se pudo eliminar el turno. Inténtalo de nuevo.",
    };

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: AppointmentId,
    ) -> Result<(), DataError> {
        store
            .delete(TABLE, payload.get())
            .await
            .map_err(|err| DataError::from_store(TABLE, Some(payload.get()), err))
    }
}

/// Appointment collection and its write operations.
///
/// The joined client name is resolved at fetch time, so renaming a client
/// leaves cached appointments showing the old name until the `appointments`
/// key is invalidated or refetched.
#[derive(Clone)]
pub struct AppointmentService {
    context: DataContext,
}

impl AppointmentService {
    pub fn new(context: DataContext) -> Self {
        Self { context }
    }

    /// Subscribe to the `appointments` key.
    pub fn appointments(&self) -> QueryHandle<Vec<Appointment>> {
        QueryHandle::new(self.context.cache().appointments().clone())
    }

    pub async fn list(&self) -> Result<Arc<Vec<Appointment>>, DataError> {
        self.context.cache().appointments().get().await
    }

    pub fn add_appointment(&self) -> Mutation<AddAppointment> {
        Mutation::new(AddAppointment, self.context.clone())
    }

    pub fn update_appointment_status(&self) -> Mutation<UpdateAppointmentStatus> {
        Mutation::new(UpdateAppointmentStatus, self.context.clone())
    }

    pub fn delete_appointment(&self) -> Mutation<DeleteAppointment> {
        Mutation::new(DeleteAppointment, self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use time::macros::{date, time};

    use super::*;

    #[test]
    fn new_appointment_requires_a_numeric_client() {
        let at = date!(2025 - 03 - 10);
        let slot = time!(9:30);
        for client_id in ["", "  ", "abc"] {
            let error = NewAppointment::new(at, slot, client_id, AppointmentStatus::Pending)
                .expect_err("rejected");
            assert_eq!(error.kind(), "validation");
        }
    }

    #[test]
    fn record_uses_wire_formats() {
        let appointment = NewAppointment::new(
            date!(2025 - 03 - 10),
            time!(9:30),
            "4",
            AppointmentStatus::Confirmed,
        )
        .expect("valid");
        let record = appointment.record();

        assert_eq!(record.get("date"), Some(&Value::from("2025-03-10")));
        assert_eq!(record.get("time"), Some(&Value::from("09:30")));
        assert_eq!(record.get("client_id"), Some(&Value::from(4)));
        assert_eq!(record.get("status"), Some(&Value::from("confirmado")));
    }

    #[test]
    fn list_query_orders_chronologically_and_joins_clients() {
        let query = list_query();
        let columns: Vec<_> = query.orders.iter().map(|order| order.column).collect();
        assert_eq!(columns, ["date", "time"]);
        assert!(query.orders.iter().all(|order| order.ascending));

        let embed = query.embed.expect("client embed");
        assert_eq!(embed.table, Table::Clients);
        assert_eq!(embed.foreign_key, "client_id");
        assert_eq!(embed.columns, ["name"]);
    }
}
