use std::{process, sync::Arc};

use agenda::{
    application::{
        appointments::{AppointmentId, AppointmentService, NewAppointment, StatusChange},
        clients::{ClientId, ClientService, ClientUpdate, NewClient},
        context::DataContext,
        dashboard::DashboardService,
        error::AppError,
        notify::TracingSink,
        repos::RecordStore,
    },
    cache::CacheConfig,
    config,
    domain::entities::{DashboardStats, UpcomingAppointment},
    infra::{error::InfraError, memory::InMemoryRecordStore, rest::RestRecordStore, telemetry},
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let store = build_store(&settings.backend)?;
    let context = DataContext::new(
        Arc::clone(&store),
        &CacheConfig::from(&settings.cache),
        Arc::new(TracingSink),
    );

    match cli_args.command {
        config::Command::Clients(args) => run_clients(context, args.command).await,
        config::Command::Appointments(args) => run_appointments(context, args.command).await,
        config::Command::Dashboard(args) => run_dashboard(store, args).await,
    }
}

fn build_store(backend: &config::BackendSettings) -> Result<Arc<dyn RecordStore>, AppError> {
    match backend.kind {
        config::BackendKind::Memory => {
            warn!("Using the in-memory backend; records are discarded on exit");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
        config::BackendKind::Rest => {
            let url = backend
                .url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("backend.url is not set"))?;
            let api_key = backend
                .api_key
                .as_deref()
                .ok_or_else(|| InfraError::configuration("backend.api_key is not set"))?;
            let store = RestRecordStore::new(url, api_key, backend.timeout)?;
            info!(base_url = %store.base_url(), "Using the REST backend");
            Ok(Arc::new(store))
        }
    }
}

async fn run_clients(context: DataContext, command: config::ClientsCommand) -> Result<(), AppError> {
    let service = ClientService::new(context);

    match command {
        config::ClientsCommand::List => {
            let clients = service.list().await?;
            print_json(&*clients)
        }
        config::ClientsCommand::Add(fields) => {
            let payload = NewClient::new(fields.name, fields.email, fields.phone, fields.notes)?;
            let client = service.add_client().mutate(payload).await?;
            print_json(&client)
        }
        config::ClientsCommand::Update { id, fields } => {
            let fields = NewClient::new(fields.name, fields.email, fields.phone, fields.notes)?;
            let payload = ClientUpdate::new(&id, fields)?;
            let client = service.update_client().mutate(payload).await?;
            print_json(&client)
        }
        config::ClientsCommand::Delete { id } => {
            let payload = ClientId::new(&id)?;
            service.delete_client().mutate(payload).await?;
            print_json(&Deleted { id: payload.get().get() })
        }
    }
}

async fn run_appointments(
    context: DataContext,
    command: config::AppointmentsCommand,
) -> Result<(), AppError> {
    let service = AppointmentService::new(context);

    match command {
        config::AppointmentsCommand::List => {
            let appointments = service.list().await?;
            print_json(&*appointments)
        }
        config::AppointmentsCommand::Add {
            date,
            time,
            client_id,
            status,
        } => {
            let payload = NewAppointment::new(date, time, &client_id, status)?;
            let appointment = service.add_appointment().mutate(payload).await?;
            print_json(&appointment)
        }
        config::AppointmentsCommand::Status { id, status } => {
            let payload = StatusChange::new(&id, status)?;
            let appointment = service.update_appointment_status().mutate(payload).await?;
            print_json(&appointment)
        }
        config::AppointmentsCommand::Delete { id } => {
            let payload = AppointmentId::new(&id)?;
            service.delete_appointment().mutate(payload).await?;
            print_json(&Deleted { id: payload.get().get() })
        }
    }
}

#[derive(Serialize)]
struct DashboardView {
    stats: DashboardStats,
    upcoming: Vec<UpcomingAppointment>,
}

async fn run_dashboard(
    store: Arc<dyn RecordStore>,
    args: config::DashboardArgs,
) -> Result<(), AppError> {
    let service = DashboardService::new(store);
    let today = args
        .today
        .unwrap_or_else(|| OffsetDateTime::now_utc().date());

    let (stats, upcoming) = tokio::try_join!(service.stats(), service.upcoming(today))?;
    print_json(&DashboardView { stats, upcoming })
}

#[derive(Serialize)]
struct Deleted {
    id: i64,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}
