//! Mutation protocol shared by every write operation.
//!
//! A mutation calls the record store once. On success it invalidates exactly
//! one cache key and emits one success toast; on failure it leaves the cache
//! untouched, logs the error, emits one error toast and returns the error.

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::application::context::DataContext;
use crate::application::error::DataError;
use crate::application::notify::Toast;
use crate::application::repos::RecordStore;
use crate::cache::CacheKey;

const METRIC_MUTATION_TOTAL: &str = "agenda_mutation_total";
const FAILURE_TITLE: &str = "Error";

/// Toast texts for the two outcomes of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success_title: &'static str,
    pub success_description: &'static str,
    pub failure_description: &'static str,
}

impl Outcome {
    fn success_toast(&self) -> Toast {
        Toast::success(self.success_title, self.success_description)
    }

    fn failure_toast(&self) -> Toast {
        Toast::error(FAILURE_TITLE, self.failure_description)
    }
}

/// One backend write together with the cache key it affects.
#[async_trait]
pub trait MutationOp: Send + Sync + 'static {
    type Payload: Send + 'static;
    type Output: Send + 'static;

    const NAME: &'static str;
    const KEY: CacheKey;
    const OUTCOME: Outcome;

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: Self::Payload,
    ) -> Result<Self::Output, DataError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Succeeded,
    Failed(DataError),
}

/// Trigger for one write operation plus its latest status.
pub struct Mutation<O: MutationOp> {
    op: O,
    context: DataContext,
    status: watch::Sender<MutationStatus>,
}

impl<O: MutationOp> Mutation<O> {
    pub(crate) fn new(op: O, context: DataContext) -> Self {
        let (status, _) = watch::channel(MutationStatus::Idle);
        Self {
            op,
            context,
            status,
        }
    }

    #[instrument(skip_all, fields(operation = O::NAME, cache_key = %O::KEY))]
    pub async fn mutate(&self, payload: O::Payload) -> Result<O::Output, DataError> {
        self.status.send_replace(MutationStatus::Pending);
        let result = self.op.execute(self.context.store(), payload).await;

        match &result {
            Ok(_) => {
                let event = self.context.cache().invalidate(O::KEY);
                info!(
                    operation = O::NAME,
                    event_epoch = event.epoch,
                    "Mutation succeeded"
                );
                counter!(METRIC_MUTATION_TOTAL, "operation" => O::NAME, "result" => "success")
                    .increment(1);
                self.context.notifier().notify(O::OUTCOME.success_toast());
                self.status.send_replace(MutationStatus::Succeeded);
            }
            Err(err) => {
                error!(
                    operation = O::NAME,
                    error = %err,
                    error_kind = err.kind(),
                    "Mutation failed"
                );
                counter!(METRIC_MUTATION_TOTAL, "operation" => O::NAME, "result" => "failure")
                    .increment(1);
                self.context.notifier().notify(O::OUTCOME.failure_toast());
                self.status.send_replace(MutationStatus::Failed(err.clone()));
            }
        }

        result
    }

    pub fn status(&self) -> MutationStatus {
        self.status.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.status.borrow(), MutationStatus::Pending)
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationStatus> {
        self.status.subscribe()
    }

    pub fn reset(&self) {
        self.status.send_replace(MutationStatus::Idle);
    }
}
