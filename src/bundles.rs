//! Concurrent download and decoding of one day's stream bundles.
//!
//! A producer pages through the day listing and feeds object handles into a
//! bounded queue drained by a fixed pool of workers. Each worker downloads and
//! decodes one bundle at a time and appends its events to the shared result.
//! The first failure cancels the pool: the producer stops enqueueing and idle
//! workers exit, while in-flight downloads may still finish.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MAX_FETCH_WORKERS;
use crate::error::{HistoryError, Result};
use crate::model::StatusEvent;
use crate::parser::{is_bundle_key, parse_bundle};
use crate::store::{BundleStore, ObjectHandle};

/// Keeps the first error reported by any task and cancels everyone else.
#[derive(Clone)]
struct FailureSlot {
    first: Arc<Mutex<Option<HistoryError>>>,
    cancel: CancellationToken,
}

impl FailureSlot {
    fn new() -> Self {
        Self {
            first: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    async fn fail(&self, err: HistoryError) {
        let mut first = self.first.lock().await;
        if first.is_none() {
            *first = Some(err);
        }
        self.cancel.cancel();
    }

    async fn take(&self) -> Option<HistoryError> {
        self.first.lock().await.take()
    }
}

/// Fetches and decodes every bundle stored for `day`.
///
/// # Errors
///
/// [`HistoryError::NotFound`] when nothing is stored under the day. Any
/// storage or decode error aborts the whole day and is returned as-is.
/// Objects without the bundle extension are skipped with a warning.
/// `workers` is clamped to `1..=MAX_FETCH_WORKERS`.
#[tracing::instrument(skip(store, day), fields(day = %day))]
pub async fn fetch_day<S>(store: Arc<S>, day: NaiveDate, workers: usize) -> Result<Vec<StatusEvent>>
where
    S: BundleStore + ?Sized + 'static,
{
    if !store.exists_for_day(day).await? {
        return Err(HistoryError::NotFound { day });
    }

    let workers = workers.clamp(1, MAX_FETCH_WORKERS);
    let failure = FailureSlot::new();
    let events: Arc<Mutex<Vec<StatusEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel::<ObjectHandle>(workers.saturating_mul(2));
    let rx = Arc::new(Mutex::new(rx));

    let mut pool = JoinSet::new();
    for worker in 0..workers {
        let store = store.clone();
        let rx = rx.clone();
        let events = events.clone();
        let failure = failure.clone();

        pool.spawn(async move {
            loop {
                let next = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = failure.cancel.cancelled() => None,
                        object = rx.recv() => object,
                    }
                };
                let Some(object) = next else { break };

                match decode_object(store.as_ref(), &object).await {
                    Ok(batch) => {
                        debug!(worker, key = %object.key, events = batch.len(), "Bundle decoded");
                        events.lock().await.extend(batch);
                    }
                    Err(e) => {
                        failure.fail(e).await;
                        break;
                    }
                }
            }
        });
    }
    drop(rx);

    let (enqueued, skipped) = match enqueue_day(store.as_ref(), day, &tx, &failure.cancel).await {
        Ok(counts) => counts,
        Err(e) => {
            failure.fail(e).await;
            (0, 0)
        }
    };
    drop(tx);

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            failure
                .fail(HistoryError::storage(format!("running bundle worker for {day}"), e))
                .await;
        }
    }

    if let Some(err) = failure.take().await {
        return Err(err);
    }

    let events = std::mem::take(&mut *events.lock().await);
    info!(objects = enqueued, skipped, events = events.len(), "Day bundles loaded");
    Ok(events)
}

/// Pages through the day listing, pushing bundle handles onto the queue until
/// the listing is exhausted or the pool is cancelled.
async fn enqueue_day<S>(
    store: &S,
    day: NaiveDate,
    tx: &mpsc::Sender<ObjectHandle>,
    cancel: &CancellationToken,
) -> Result<(usize, usize)>
where
    S: BundleStore + ?Sized,
{
    let mut enqueued = 0;
    let mut skipped = 0;
    let mut token = None;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let page = store.list_page(day, token).await?;
        for object in page.objects {
            if !is_bundle_key(&object.key) {
                warn!(key = %object.key, "Object in day folder is not a .json.gz bundle, skipping");
                skipped += 1;
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                res = tx.send(object) => res.is_ok(),
            };
            if !sent {
                return Ok((enqueued, skipped));
            }
            enqueued += 1;
        }

        token = page.next_token;
        if token.is_none() {
            break;
        }
    }

    Ok((enqueued, skipped))
}

async fn decode_object<S>(store: &S, object: &ObjectHandle) -> Result<Vec<StatusEvent>>
where
    S: BundleStore + ?Sized,
{
    let bytes = store.fetch(object).await?;
    parse_bundle(&object.key, &bytes)
}
