//! Dashboard read model: headline counts and the next pending appointments.
//!
//! Both reads go straight to the record store; neither is cached, so a
//! dashboard always reflects the backend at the time of the call.

use std::sync::Arc;

use time::Date;
use tracing::{error, instrument};

use crate::application::error::DataError;
use crate::application::mapping::map_upcoming;
use crate::application::repos::{Filter, ListQuery, RecordStore};
use crate::domain::calendar::format_date;
use crate::domain::entities::{DashboardStats, UpcomingAppointment};
use crate::domain::types::{AppointmentStatus, Table};

const SOURCE: &str = "application::dashboard::DashboardService";
const STATS_FAILURE_MESSAGE: &str = "Failed to compute dashboard counts";
const UPCOMING_FAILURE_MESSAGE: &str = "Failed to list upcoming appointments";
const UPCOMING_LIMIT: usize = 5;

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn RecordStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DashboardStats, DataError> {
        let (total_appointments, total_clients, pending_appointments, completed_appointments) =
            tokio::try_join!(
                self.count(Table::Appointments, None),
                self.count(Table::Clients, None),
                self.count(Table::Appointments, Some(AppointmentStatus::Pending)),
                self.count(Table::Appointments, Some(AppointmentStatus::Done)),
            )
            .inspect_err(|err| log_failure(STATS_FAILURE_MESSAGE, err))?;

        Ok(DashboardStats {
            total_appointments,
            total_clients,
            pending_appointments,
            completed_appointments,
        })
    }

    /// Pending appointments on or after `today`, soonest first, at most five.
    #[instrument(skip(self))]
    pub async fn upcoming(&self, today: Date) -> Result<Vec<UpcomingAppointment>, DataError> {
        let query = ListQuery::new()
            .filter(Filter::gte("date", format_date(today)))
            .filter(Filter::eq("status", AppointmentStatus::Pending.as_str()))
            .order_by("date", true)
            .order_by("time", true)
            .limit(UPCOMING_LIMIT)
            .embed(Table::Clients, "client_id", &["name", "email", "phone"]);

        let rows = self
            .store
            .list(Table::Appointments, &query)
            .await
            .map_err(|err| DataError::from_store(Table::Appointments, None, err))
            .inspect_err(|err| log_failure(UPCOMING_FAILURE_MESSAGE, err))?;
        map_upcoming(rows)
    }

    async fn count(
        &self,
        table: Table,
        status: Option<AppointmentStatus>,
    ) -> Result<u64, DataError> {
        let filters: Vec<Filter> = status
            .map(|status| Filter::eq("status", status.as_str()))
            .into_iter()
            .collect();
        self.store
            .count(table, &filters)
            .await
            .map_err(|err| DataError::from_store(table, None, err))
    }
}

fn log_failure(message: &'static str, err: &DataError) {
    error!(
        source = SOURCE,
        error = %err,
        error_kind = err.kind(),
        "{message}"
    );
}
