//! Routes build requests and completions to per-owner queue actors.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::handle::{OwnerQueueHandle, QueueSnapshot};
use super::owner_queue::{OwnerBuildQueue, QueueCollaborators};
use crate::control_plane::ControlPlaneConfig;
use crate::errors::BuildQueueError;
use crate::events::BusEvent;
use crate::types::{BuildRequestEvent, BuildResultId, Owner, RequestId};

#[derive(Default)]
struct Queues {
    handles: BTreeMap<Owner, OwnerQueueHandle>,
    tasks: Vec<JoinHandle<()>>,
    stopped: bool,
}

/// Owner-to-queue router.
///
/// Queues are created on first use with the owner's configured cap. Once
/// [`stop_all()`](Self::stop_all) has run, queues created later start out
/// stopped.
pub struct BuildQueueService {
    collaborators: QueueCollaborators,
    config: ControlPlaneConfig,
    queues: Mutex<Queues>,
}

impl BuildQueueService {
    pub fn new(collaborators: QueueCollaborators, config: ControlPlaneConfig) -> Self {
        Self {
            collaborators,
            config,
            queues: Mutex::new(Queues::default()),
        }
    }

    /// Handle to `owner`'s queue, spawning the queue if needed.
    pub fn queue_for(&self, owner: Owner) -> OwnerQueueHandle {
        let mut queues = self.queues.lock();
        if let Some(handle) = queues.handles.get(&owner) {
            return handle.clone();
        }

        let max_active = self.config.max_active_for(owner);
        let mut queue = OwnerBuildQueue::new(owner, max_active, self.collaborators.clone());
        if queues.stopped {
            queue.stop();
        }
        let (handle, task) = OwnerQueueHandle::spawn(queue, self.config.command_capacity);
        tracing::debug!(owner = %owner, max_active, "created owner build queue");

        queues.handles.insert(owner, handle.clone());
        queues.tasks.push(task);
        handle
    }

    /// Route a request to its owner's queue.
    pub async fn handle_request(&self, request: BuildRequestEvent) -> Result<(), BuildQueueError> {
        self.queue_for(request.owner()).enqueue(request).await
    }

    /// Route a completion to `owner`'s queue. Returns `false` when the owner
    /// has no queue or no matching active build.
    pub async fn handle_build_completed(
        &self,
        owner: Owner,
        build_result_id: BuildResultId,
    ) -> Result<bool, BuildQueueError> {
        match self.existing(owner) {
            Some(handle) => handle.completed(build_result_id).await,
            None => Ok(false),
        }
    }

    pub async fn cancel_queued_request(
        &self,
        owner: Owner,
        request_id: RequestId,
        principal: &str,
    ) -> Result<bool, BuildQueueError> {
        match self.existing(owner) {
            Some(handle) => handle.cancel(request_id, principal).await,
            None => Ok(false),
        }
    }

    /// Snapshot of `owner`'s queue, if it has one.
    pub async fn snapshot(&self, owner: Owner) -> Result<Option<QueueSnapshot>, BuildQueueError> {
        match self.existing(owner) {
            Some(handle) => handle.snapshot().await.map(Some),
            None => Ok(None),
        }
    }

    /// Owners that currently have a queue.
    pub fn owners(&self) -> Vec<Owner> {
        self.queues.lock().handles.keys().copied().collect()
    }

    /// Stop every queue. Active builds keep running.
    pub async fn stop_all(&self) {
        let handles: Vec<OwnerQueueHandle> = {
            let mut queues = self.queues.lock();
            queues.stopped = true;
            queues.handles.values().cloned().collect()
        };

        for handle in handles {
            if let Err(e) = handle.stop().await {
                tracing::warn!(owner = %handle.owner(), error = %e, "failed to stop owner queue");
            }
        }
        tracing::info!("all build queues stopped");
    }

    /// Close every queue actor and wait for it to exit. Handles still held
    /// elsewhere fail with [`BuildQueueError::QueueClosed`] afterwards.
    pub async fn close(&self) {
        let (handles, tasks) = {
            let mut queues = self.queues.lock();
            let handles = std::mem::take(&mut queues.handles);
            (handles, std::mem::take(&mut queues.tasks))
        };
        for handle in handles.into_values() {
            // Already gone is fine.
            let _ = handle.close().await;
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::debug!("build queues closed");
    }

    /// Feed `BuildCompleted` events into the owning queues until `shutdown`
    /// fires or every publisher is gone.
    ///
    /// `events` is normally
    /// `bus.subscribe_lossless(BusEvent::is_build_completed)`, so a burst of
    /// completions queues up here instead of being dropped.
    pub async fn listen_for_completions(
        &self,
        mut events: mpsc::UnboundedReceiver<BusEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = events.recv() => match received {
                    Some(BusEvent::BuildCompleted { owner, build_result_id }) => {
                        if let Err(e) = self.handle_build_completed(owner, build_result_id).await {
                            tracing::warn!(
                                owner = %owner,
                                build_result_id = %build_result_id,
                                error = %e,
                                "failed to process build completion"
                            );
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        tracing::debug!("completion listener stopped");
    }

    fn existing(&self, owner: Owner) -> Option<OwnerQueueHandle> {
        self.queues.lock().handles.get(&owner).cloned()
    }
}

impl std::fmt::Debug for BuildQueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildQueueService")
            .field("owners", &self.owners())
            .finish_non_exhaustive()
    }
}
