// Batch Orchestrator: sequential, single-flight processing of the queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::core::errors::{QueueError, QueueResult};
use crate::core::types::{BatchReport, ItemId, ItemReport, Progress, QueueItem, StatusKind};
use crate::queue::SharedQueue;
use crate::services::conversion::Converter;
use crate::services::insight::InsightProvider;
use crate::utils::Metrics;

/// Main batch orchestrator
pub struct BatchOrchestrator<P> {
    queue: SharedQueue,
    converter: Converter<P>,
    running: AtomicBool,
    progress: watch::Sender<Progress>,
    metrics: Option<Metrics>,
}

/// Clears the running flag however `process_all` exits
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: InsightProvider> BatchOrchestrator<P> {
    pub fn new(queue: SharedQueue, converter: Converter<P>, metrics: Option<Metrics>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            queue,
            converter,
            running: AtomicBool::new(false),
            progress,
            metrics,
        }
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    /// Receive progress updates as items move through the batch
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Latest published progress
    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> QueueResult<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueueError::AlreadyRunning)?;
        Ok(RunGuard(&self.running))
    }

    fn publish(&self, current: usize, total: usize, id: Option<&ItemId>, status: Option<StatusKind>) {
        self.progress.send_replace(Progress {
            running: true,
            current,
            total,
            current_id: id.cloned(),
            last_status: status,
        });
    }

    /// Process every queued item that is not yet completed.
    ///
    /// # Workflow:
    /// 1. Snapshot the queue order
    /// 2. For each item: mark `Processing`, convert, apply the result
    /// 3. One item in flight at a time; failures never stop the batch
    ///
    /// Items removed while their conversion runs have their result discarded.
    /// A second call while a batch is running returns `AlreadyRunning`.
    #[instrument(skip(self))]
    pub async fn process_all(&self) -> QueueResult<BatchReport> {
        let _guard = self.try_begin()?;

        let order = self.queue.read().ids();
        let total = order.len();
        if total == 0 {
            debug!("Queue is empty, nothing to process");
            return Ok(BatchReport::default());
        }

        let start_time = Instant::now();
        info!("Processing {} queued images", total);
        self.publish(0, total, None, None);

        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        for (index, id) in order.iter().enumerate() {
            let source = {
                let mut queue = self.queue.write();
                match queue.get(id).map(QueueItem::is_completed) {
                    None => {
                        debug!("Item {} was removed before its turn", id);
                        report.discarded += 1;
                        continue;
                    }
                    Some(true) => {
                        report.skipped += 1;
                        continue;
                    }
                    Some(false) => queue.begin_processing(id),
                }
            };
            let Some(source) = source else {
                continue;
            };

            self.publish(index + 1, total, Some(id), Some(StatusKind::Processing));

            let item_start = Instant::now();
            let result = self.converter.convert(&source).await;
            let elapsed_ms = item_start.elapsed().as_secs_f64() * 1000.0;

            let item_report = {
                let mut queue = self.queue.write();
                let applied = match result {
                    Ok(converted) => queue.complete(id, converted),
                    Err(e) => {
                        error!("Conversion of {} failed: {}", source.name, e);
                        queue.fail(id, e.to_string())
                    }
                };
                if applied {
                    queue.get(id).map(|item| ItemReport::from_item(item, elapsed_ms))
                } else {
                    None
                }
            };

            match item_report {
                Some(item_report) => {
                    match item_report.status {
                        StatusKind::Completed => {
                            info!(
                                "[{}/{}] {} converted in {:.2}ms",
                                index + 1,
                                total,
                                source.name,
                                elapsed_ms
                            );
                            report.completed += 1;
                        }
                        StatusKind::Error => report.failed += 1,
                        _ => {}
                    }
                    self.publish(index + 1, total, Some(id), Some(item_report.status));
                    report.results.push(item_report);
                }
                None => {
                    debug!(
                        "{} was removed while processing, discarding its result",
                        source.name
                    );
                    report.discarded += 1;
                }
            }
        }

        report.processing_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        self.progress.send_modify(|progress| progress.running = false);

        if let Some(ref m) = self.metrics {
            m.record_batch_processed();
        }

        info!(
            "Batch finished in {:.2}s: {} completed, {} failed, {} skipped, {} discarded",
            report.processing_time_ms / 1000.0,
            report.completed,
            report.failed,
            report.skipped,
            report.discarded
        );

        Ok(report)
    }
}
