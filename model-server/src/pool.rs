//! Worker pool: a resizable set of plugin workers and their busy mask.
//!
//! Admission picks a random free slot under one short critical section and
//! releases the lock before any work runs. Callers that find no free slot
//! wait for a release notification, re-checking at least once a second.
//! Requests are never rejected and there is no fairness guarantee.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use inference_common::notification::{NotificationQueue, DEFAULT_CAPACITY, KIND_LOG};
use inference_common::Notification;

use crate::error::{Error, Result};
use crate::plugin::{PluginDescriptor, Worker, WorkerContext};

const ADMISSION_POLL: Duration = Duration::from_secs(1);

/// Creates workers for one resolved plugin.
#[derive(Debug, Clone)]
pub struct WorkerSpawner {
    pub descriptor: PluginDescriptor,
    pub upstream_config: Map<String, Value>,
}

impl WorkerSpawner {
    pub fn new(descriptor: PluginDescriptor, upstream_config: Map<String, Value>) -> Self {
        Self {
            descriptor,
            upstream_config,
        }
    }

    fn create(&self, worker_id: usize) -> Result<WorkerSlot> {
        let notifications = NotificationQueue::new(
            format!("{}:{}", self.descriptor.class_name, worker_id),
            DEFAULT_CAPACITY,
        );
        let ctx = WorkerContext::new(
            worker_id,
            &self.descriptor.default_config,
            &self.upstream_config,
            notifications.clone(),
        );
        let mut worker = (self.descriptor.factory)(ctx);
        worker.load().map_err(Error::WorkerCreation)?;

        Ok(WorkerSlot {
            index: worker_id,
            worker: Mutex::new(worker),
            notifications,
        })
    }
}

/// A worker at a fixed index.
pub struct WorkerSlot {
    index: usize,
    worker: Mutex<Box<dyn Worker>>,
    notifications: NotificationQueue,
}

impl WorkerSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Default)]
struct PoolState {
    slots: Vec<Arc<WorkerSlot>>,
    busy: Vec<bool>,
}

/// Result of a resize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeOutcome {
    Grown { created: usize, previous: usize, total: usize },
    Unchanged { total: usize },
    /// Idle tail slots were evicted; `deferred` busy or non-tail slots remain.
    Shrunk { removed: usize, deferred: usize, total: usize },
}

/// A completed dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub slot: usize,
    pub value: Value,
}

pub struct WorkerPool {
    spawner: WorkerSpawner,
    state: Mutex<PoolState>,
    resize_lock: Mutex<()>,
    released: Notify,
    notifications: NotificationQueue,
}

/// Exclusive claim on a slot; dropping it frees the slot.
pub struct SlotLease {
    pool: Arc<WorkerPool>,
    slot: Arc<WorkerSlot>,
}

impl SlotLease {
    pub fn index(&self) -> usize {
        self.slot.index
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.slot.index);
    }
}

impl WorkerPool {
    /// Empty pool; call [`WorkerPool::resize`] to create workers.
    pub fn new(spawner: WorkerSpawner, notifications: NotificationQueue) -> Arc<Self> {
        Arc::new(Self {
            spawner,
            state: Mutex::new(PoolState::default()),
            resize_lock: Mutex::new(()),
            released: Notify::new(),
            notifications,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn class_name(&self) -> &str {
        &self.spawner.descriptor.class_name
    }

    pub fn size(&self) -> usize {
        self.lock_state().slots.len()
    }

    pub fn busy_count(&self) -> usize {
        self.lock_state().busy.iter().filter(|b| **b).count()
    }

    pub fn is_busy(&self, index: usize) -> bool {
        self.lock_state().busy.get(index).copied().unwrap_or(false)
    }

    /// Grow or shrink the pool to `target` workers, never below one.
    ///
    /// Blocking: worker construction runs plugin load code.
    pub fn resize(&self, target: usize) -> Result<ResizeOutcome> {
        if target == 0 {
            tracing::warn!("Ignoring request for 0 workers, keeping at least 1");
        }
        let target = target.max(1);
        let _guard = self.resize_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.size();

        if target > current {
            let created = target - current;
            let msg = format!(
                "Creating {} workers for class '{}'",
                created,
                self.class_name()
            );
            tracing::info!("{}", msg);
            self.notifications.push(KIND_LOG, msg);

            let mut fresh = Vec::with_capacity(created);
            for worker_id in current..target {
                fresh.push(Arc::new(self.spawner.create(worker_id)?));
            }

            {
                let mut state = self.lock_state();
                for slot in fresh {
                    state.slots.push(slot);
                    state.busy.push(false);
                }
            }
            self.released.notify_waiters();

            self.notifications.push(
                KIND_LOG,
                format!(
                    "Created {} new workers. (were:{}, total:{})",
                    created, current, target
                ),
            );
            return Ok(ResizeOutcome::Grown {
                created,
                previous: current,
                total: target,
            });
        }

        if target == current {
            self.notifications.push(
                KIND_LOG,
                format!("Update with no effect, there are already {} workers", target),
            );
            return Ok(ResizeOutcome::Unchanged { total: current });
        }

        let mut state = self.lock_state();
        let mut removed = 0;
        while state.slots.len() > target && state.busy.last() == Some(&false) {
            state.slots.pop();
            state.busy.pop();
            removed += 1;
        }
        let total = state.slots.len();
        drop(state);

        let deferred = total - target;
        let msg = format!(
            "Removed {} idle workers (total:{}), {} busy workers kept",
            removed, total, deferred
        );
        tracing::info!("{}", msg);
        self.notifications.push(KIND_LOG, msg);

        Ok(ResizeOutcome::Shrunk {
            removed,
            deferred,
            total,
        })
    }

    /// Claim a random free slot without waiting.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotLease> {
        let mut state = self.lock_state();
        let free: Vec<usize> = state
            .busy
            .iter()
            .enumerate()
            .filter(|(_, busy)| !**busy)
            .map(|(idx, _)| idx)
            .collect();
        let index = *free.choose(&mut rand::thread_rng())?;
        state.busy[index] = true;
        let slot = Arc::clone(&state.slots[index]);
        drop(state);

        Some(SlotLease {
            pool: Arc::clone(self),
            slot,
        })
    }

    /// Claim a slot, waiting as long as needed.
    pub async fn acquire(self: &Arc<Self>) -> SlotLease {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_acquire() {
                return lease;
            }
            let _ = tokio::time::timeout(ADMISSION_POLL, notified).await;
        }
    }

    fn release(&self, index: usize) {
        {
            let mut state = self.lock_state();
            if let Some(busy) = state.busy.get_mut(index) {
                *busy = false;
            }
        }
        self.released.notify_waiters();
    }

    /// Run `inputs` on a free worker. The slot is freed however the worker
    /// finishes, including a panic.
    pub async fn dispatch(self: &Arc<Self>, inputs: Map<String, Value>, call_id: u64) -> Result<Dispatched> {
        let lease = self.acquire().await;
        let slot = Arc::clone(&lease.slot);
        let index = slot.index;

        let joined = tokio::task::spawn_blocking(move || {
            let _lease = lease;
            let mut worker = slot.worker.lock().unwrap_or_else(|e| e.into_inner());
            worker.execute(&inputs, call_id)
        })
        .await;

        match joined {
            Ok(Ok(value)) => Ok(Dispatched { slot: index, value }),
            Ok(Err(source)) => Err(Error::Worker { slot: index, source }),
            Err(e) => {
                tracing::error!("Worker {} failed on call {}: {}", index, call_id, e);
                Err(Error::WorkerPanicked(index))
            }
        }
    }

    /// Drain the notifications of every worker, slot order.
    pub fn drain_worker_notifications(&self) -> Vec<Notification> {
        let slots: Vec<Arc<WorkerSlot>> = self.lock_state().slots.clone();
        slots
            .iter()
            .flat_map(|slot| slot.notifications.drain())
            .collect()
    }
}
