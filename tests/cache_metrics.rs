use std::collections::HashSet;
use std::sync::Arc;

use agenda::application::clients::{ClientId, ClientService, NewClient};
use agenda::application::context::DataContext;
use agenda::application::notify::MemorySink;
use agenda::application::repos::RecordStore;
use agenda::cache::CacheConfig;
use agenda::infra::memory::InMemoryRecordStore;
use agenda::infra::telemetry;
use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn cache_and_mutation_metrics_are_emitted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let config = CacheConfig {
        refetch_on_invalidate: false,
        ..Default::default()
    };
    let context = DataContext::new(store, &config, Arc::new(MemorySink::new()));
    let service = ClientService::new(context);

    service.list().await.expect("miss");
    service.list().await.expect("hit");
    let payload = NewClient::new("Ana", "a@x.com", "555", None).expect("valid");
    service.add_client().mutate(payload).await.expect("inserted");
    service
        .delete_client()
        .mutate(ClientId::new("404").expect("id"))
        .await
        .expect_err("missing row");
    service.list().await.expect("refetch");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "agenda_cache_hit_total",
        "agenda_cache_miss_total",
        "agenda_cache_fetch_total",
        "agenda_cache_fetch_ms",
        "agenda_cache_invalidate_total",
        "agenda_mutation_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
