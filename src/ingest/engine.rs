//! The ingest engine: a double-buffered reading queue with a batching drain
//! thread.
//!
//! Producers call [`ingest`](IngestEngine::ingest) and block only for the
//! duration of a queue append. The drain thread wakes on a bounded condvar
//! wait (so idle queues still flush once per timeout), swaps the live queue
//! for a fresh vector while holding the lock, and then works on the drained
//! batch outside the lock: filter dispatch, asset discovery, storage append,
//! statistics accounting. A failed append either requeues the batch at the
//! front of the live queue for the next drain or charges it to the discarded
//! counter, depending on configuration.
//!
//! Exactly three long-running thread roles exist per engine: the producer
//! context, the drain thread, and the statistics thread. Filter callbacks
//! execute on the drain thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::filter::{Filter, FilterPipeline};
use crate::ingest::stats::StatsCollector;
use crate::ingest::tracker::AssetTracker;
use crate::management::ManagementClient;
use crate::model::{AssetTrackingTuple, Reading, ReadingSet};
use crate::storage::{PluginData, StorageClient};

struct EngineShared {
    config: IngestConfig,
    storage: Arc<dyn StorageClient>,
    running: AtomicBool,
    queue: Mutex<Vec<Reading>>,
    drain_signal: Condvar,
    pipeline: Mutex<FilterPipeline>,
    tracker: AssetTracker,
    stats: StatsCollector,
    /// Set while the last append failed, so retries pace on the timeout
    /// instead of spinning against a down backend.
    append_failed: AtomicBool,
}

impl EngineShared {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bounded wait for the next drain: woken early when the queue crosses
    /// the threshold or shutdown begins, otherwise once per timeout. A
    /// queue already over threshold skips the wait, unless the previous
    /// append failed and the retry must be paced.
    fn wait_for_queue(&self) {
        let mut queue = self.queue.lock();
        let pace_retry = self.append_failed.load(Ordering::SeqCst);
        if self.running() && (pace_retry || queue.len() < self.config.threshold) {
            let _ = self
                .drain_signal
                .wait_for(&mut queue, Duration::from_millis(self.config.timeout_ms));
        }
    }

    /// Drain the queue and flush the batch to storage.
    ///
    /// The queue mutex is held only for the buffer swap; everything after
    /// runs on the drained batch without blocking producers.
    fn process_queue(&self) {
        let mut batch = {
            let mut queue = self.queue.lock();
            std::mem::take(&mut *queue)
        };

        {
            let mut pipeline = self.pipeline.lock();
            if !pipeline.is_empty() {
                batch = pipeline.process(ReadingSet::new(batch)).into_readings();
                if batch.is_empty() {
                    // The filters consumed everything; nothing to account.
                    return;
                }
            }
        }

        if batch.is_empty() {
            self.stats.signal();
            return;
        }

        // Discover new assets and compute per-asset counts for this batch.
        let mut counts: HashMap<String, u64> = HashMap::new();
        for reading in &batch {
            let tuple = AssetTrackingTuple::ingest(
                &self.config.service_name,
                &self.config.plugin_name,
                &reading.asset_code,
            );
            if !self.tracker.check(&tuple) {
                info!(asset = %reading.asset_code, "new asset seen during ingest");
                self.tracker.register(tuple);
            }
            *counts.entry(reading.asset_code.clone()).or_insert(0) += 1;
        }

        match self.storage.reading_append(&batch) {
            Ok(()) => {
                self.append_failed.store(false, Ordering::SeqCst);
                self.stats.add_batch(&counts);
            }
            Err(e) if self.config.requeue_on_failure => {
                error!(error = %e, count = batch.len(),
                       "failed to write readings to storage, buffering for retry");
                self.append_failed.store(true, Ordering::SeqCst);
                let mut queue = self.queue.lock();
                // Prepend the failed batch so its readings go out first on
                // the next drain.
                batch.extend(queue.drain(..));
                *queue = batch;
            }
            Err(e) => {
                warn!(error = %e, count = batch.len(),
                      "could not send readings to storage, discarding");
                self.append_failed.store(false, Ordering::SeqCst);
                self.stats.add_discarded(batch.len() as u64);
            }
        }

        self.stats.signal();
    }

    fn update_stats(&self) {
        self.stats.update(self.storage.as_ref(), &self.running);
    }
}

/// The readings ingest engine.
///
/// Owns the queue, the filter pipeline, the asset tracker and the
/// statistics collector, plus the two background threads driving them.
/// Dropping the engine shuts it down cleanly.
pub struct IngestEngine {
    shared: Arc<EngineShared>,
    drain_thread: Option<JoinHandle<()>>,
    stats_thread: Option<JoinHandle<()>>,
}

impl IngestEngine {
    /// Validate the configuration, prime the asset-tracking cache, build
    /// the filter pipeline, and spawn the drain and statistics threads.
    pub fn start(
        config: IngestConfig,
        storage: Arc<dyn StorageClient>,
        management: Arc<dyn ManagementClient>,
        filters: Vec<Box<dyn Filter>>,
    ) -> Result<Self> {
        config.validate()?;

        let tracker = AssetTracker::new(
            management.clone(),
            &config.service_name,
            &config.plugin_name,
        );
        tracker.populate();

        let pipeline = FilterPipeline::build(
            filters,
            management.as_ref(),
            &config.service_name,
            Some(PluginData::new(storage.clone())),
        )?;

        info!(
            service = %config.service_name,
            plugin = %config.plugin_name,
            timeout_ms = config.timeout_ms,
            threshold = config.threshold,
            filters = pipeline.len(),
            "ingest engine starting"
        );

        let shared = Arc::new(EngineShared {
            config,
            storage,
            running: AtomicBool::new(true),
            queue: Mutex::new(Vec::new()),
            drain_signal: Condvar::new(),
            pipeline: Mutex::new(pipeline),
            tracker,
            stats: StatsCollector::new(),
            append_failed: AtomicBool::new(false),
        });

        let drain_shared = shared.clone();
        let drain_thread = std::thread::Builder::new()
            .name("edgeline-drain".to_string())
            .spawn(move || {
                while drain_shared.running() {
                    drain_shared.wait_for_queue();
                    drain_shared.process_queue();
                }
            })?;

        let stats_shared = shared.clone();
        let stats_thread = std::thread::Builder::new()
            .name("edgeline-stats".to_string())
            .spawn(move || {
                while stats_shared.running() {
                    stats_shared.update_stats();
                }
            })?;

        Ok(Self {
            shared,
            drain_thread: Some(drain_thread),
            stats_thread: Some(stats_thread),
        })
    }

    /// Whether the engine is accepting its normal drain cadence; false once
    /// shutdown has begun.
    pub fn running(&self) -> bool {
        self.shared.running()
    }

    /// Queue one reading. Blocks only on the queue mutex.
    pub fn ingest(&self, reading: Reading) {
        let mut queue = self.shared.queue.lock();
        queue.push(reading);
        if queue.len() >= self.shared.config.threshold || !self.shared.running() {
            self.shared.drain_signal.notify_all();
        }
    }

    /// Queue a batch of readings, preserving their order.
    pub fn ingest_many(&self, readings: Vec<Reading>) {
        let mut queue = self.shared.queue.lock();
        queue.extend(readings);
        if queue.len() >= self.shared.config.threshold || !self.shared.running() {
            self.shared.drain_signal.notify_all();
        }
    }

    /// Number of readings waiting in the live queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Route a configuration-category change to the owning filter.
    pub fn config_change(&self, category: &str, config: &str) {
        self.shared.pipeline.lock().config_change(category, config);
    }

    /// Cooperative shutdown: stop the cadence, join both threads, run one
    /// final drain and one final statistics flush, then release the
    /// filters. No reading is leaked or double-appended; readings queued
    /// after shutdown begins are covered by the final drain.
    pub fn shutdown(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("ingest engine shutting down");

        // Notify under the queue lock so the drain thread cannot miss the
        // wakeup between its running check and the wait.
        {
            let _queue = self.shared.queue.lock();
            self.shared.drain_signal.notify_all();
        }
        if let Some(handle) = self.drain_thread.take() {
            let _ = handle.join();
        }

        // Final flush on this thread covers anything queued since the drain
        // thread exited.
        self.shared.process_queue();

        // Wake the aggregator so it observes shutdown even when the final
        // drain had nothing to flush.
        self.shared.stats.signal();
        if let Some(handle) = self.stats_thread.take() {
            let _ = handle.join();
        }
        self.shared.update_stats();

        self.shared.pipeline.lock().shutdown();
        info!("ingest engine stopped");
    }
}

impl Drop for IngestEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
