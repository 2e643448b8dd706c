//! Per-owner queue actor.
//!
//! Each [`OwnerBuildQueue`] is moved into its own tokio task and only ever
//! touched from there. Callers talk to it through an [`OwnerQueueHandle`],
//! which sends commands over an mpsc mailbox and awaits a oneshot reply.
//! Commands are processed one at a time, in arrival order.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::owner_queue::{ActiveBuild, OwnerBuildQueue};
use crate::errors::BuildQueueError;
use crate::types::{BuildRequestEvent, BuildResultId, Owner, RequestId};

/// Point-in-time copy of one owner's queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub owner: Owner,
    pub max_active: usize,
    pub stopped: bool,
    /// Newest first.
    pub active: Vec<ActiveBuild>,
    /// Newest first.
    pub queued: Vec<BuildRequestEvent>,
}

enum QueueCommand {
    Enqueue {
        request: BuildRequestEvent,
        reply: oneshot::Sender<Result<(), BuildQueueError>>,
    },
    Completed {
        build_result_id: BuildResultId,
        reply: oneshot::Sender<Result<bool, BuildQueueError>>,
    },
    Cancel {
        request_id: RequestId,
        principal: String,
        reply: oneshot::Sender<Result<bool, BuildQueueError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Close,
}

/// Cloneable handle to a running owner queue.
///
/// The actor exits after [`close()`](Self::close) or once every handle has
/// been dropped. Calls made after that fail with
/// [`BuildQueueError::QueueClosed`].
#[derive(Clone)]
pub struct OwnerQueueHandle {
    owner: Owner,
    tx: mpsc::Sender<QueueCommand>,
}

impl OwnerQueueHandle {
    /// Move `queue` into a new task with a mailbox of `capacity` commands.
    pub fn spawn(queue: OwnerBuildQueue, capacity: usize) -> (Self, JoinHandle<()>) {
        let owner = queue.owner();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run(queue, rx));
        (Self { owner, tx }, task)
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// See [`OwnerBuildQueue::handle_request`].
    pub async fn enqueue(&self, request: BuildRequestEvent) -> Result<(), BuildQueueError> {
        self.call(|reply| QueueCommand::Enqueue { request, reply })
            .await?
    }

    /// See [`OwnerBuildQueue::handle_build_completed`].
    pub async fn completed(&self, build_result_id: BuildResultId) -> Result<bool, BuildQueueError> {
        self.call(|reply| QueueCommand::Completed {
            build_result_id,
            reply,
        })
        .await?
    }

    /// See [`OwnerBuildQueue::cancel_queued_request`].
    pub async fn cancel(
        &self,
        request_id: RequestId,
        principal: &str,
    ) -> Result<bool, BuildQueueError> {
        let principal = principal.to_string();
        self.call(|reply| QueueCommand::Cancel {
            request_id,
            principal,
            reply,
        })
        .await?
    }

    /// Stop the queue. Resolves once the actor has applied the stop, so
    /// every command sent afterwards sees a stopped queue.
    pub async fn stop(&self) -> Result<(), BuildQueueError> {
        self.call(|reply| QueueCommand::Stop { reply }).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, BuildQueueError> {
        self.call(|reply| QueueCommand::Snapshot { reply }).await
    }

    /// Ask the actor to exit once the commands already in its mailbox have
    /// been applied, even while other handles are still alive.
    pub async fn close(&self) -> Result<(), BuildQueueError> {
        self.tx
            .send(QueueCommand::Close)
            .await
            .map_err(|_| self.closed())
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand,
    ) -> Result<T, BuildQueueError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> BuildQueueError {
        BuildQueueError::QueueClosed { owner: self.owner }
    }
}

impl std::fmt::Debug for OwnerQueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerQueueHandle")
            .field("owner", &self.owner)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

async fn run(mut queue: OwnerBuildQueue, mut rx: mpsc::Receiver<QueueCommand>) {
    tracing::debug!(owner = %queue.owner(), "owner queue started");

    while let Some(command) = rx.recv().await {
        // A dropped reply receiver means the caller gave up; the command
        // has still been applied.
        match command {
            QueueCommand::Enqueue { request, reply } => {
                let _ = reply.send(queue.handle_request(request).await);
            }
            QueueCommand::Completed {
                build_result_id,
                reply,
            } => {
                let _ = reply.send(queue.handle_build_completed(build_result_id).await);
            }
            QueueCommand::Cancel {
                request_id,
                principal,
                reply,
            } => {
                let _ = reply.send(queue.cancel_queued_request(request_id, &principal));
            }
            QueueCommand::Stop { reply } => {
                queue.stop();
                let _ = reply.send(());
            }
            QueueCommand::Snapshot { reply } => {
                let _ = reply.send(QueueSnapshot {
                    owner: queue.owner(),
                    max_active: queue.max_active(),
                    stopped: queue.is_stopped(),
                    active: queue.active_builds_snapshot(),
                    queued: queue.queued_builds_snapshot(),
                });
            }
            QueueCommand::Close => break,
        }
    }

    tracing::debug!(owner = %queue.owner(), "owner queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{AllowAllAccessManager, RecordingRequestRegistry};
    use crate::events::EventBus;
    use crate::queue::owner_queue::tests::{manual, MockFactory};
    use crate::queue::QueueCollaborators;
    use crate::types::ProjectId;
    use std::sync::Arc;

    const OWNER: Owner = Owner::Project(ProjectId(5));

    fn spawn(max_active: usize) -> (OwnerQueueHandle, JoinHandle<()>) {
        let queue = OwnerBuildQueue::new(
            OWNER,
            max_active,
            QueueCollaborators {
                factory: Arc::new(MockFactory::default()),
                access: Arc::new(AllowAllAccessManager),
                registry: Arc::new(RecordingRequestRegistry::new()),
                bus: EventBus::new(16),
            },
        );
        OwnerQueueHandle::spawn(queue, 8)
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() {
        let (handle, _task) = spawn(1);
        let first = manual(OWNER);
        let second = manual(OWNER);

        handle.enqueue(first.clone()).await.unwrap();
        handle.enqueue(second.clone()).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.owner, OWNER);
        assert_eq!(snapshot.active.len(), 1);
        assert_eq!(snapshot.queued.len(), 1);

        assert!(handle.completed(BuildResultId(101)).await.unwrap());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.active[0].request().id(), second.id());
        assert!(snapshot.queued.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_the_caller() {
        let (handle, _task) = spawn(1);
        let err = handle
            .enqueue(manual(Owner::Project(ProjectId(6))))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildQueueError::OwnerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cancel_and_stop_through_handle() {
        let (handle, _task) = spawn(0);
        let waiting = manual(OWNER);
        handle.enqueue(waiting.clone()).await.unwrap();

        assert!(handle.cancel(waiting.id(), "admin").await.unwrap());
        handle.stop().await.unwrap();
        assert!(handle.snapshot().await.unwrap().stopped);
    }

    #[tokio::test]
    async fn test_actor_exits_when_handles_drop() {
        let (handle, task) = spawn(1);
        let clone = handle.clone();
        drop(handle);
        assert!(clone.snapshot().await.is_ok());
        drop(clone);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_ends_the_actor_while_handles_live() {
        let (handle, task) = spawn(1);
        let held = handle.clone();
        handle.enqueue(manual(OWNER)).await.unwrap();

        handle.close().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        let err = held.snapshot().await.unwrap_err();
        assert!(matches!(err, BuildQueueError::QueueClosed { owner } if owner == OWNER));
        assert!(held.close().await.is_err());
    }

    #[tokio::test]
    async fn test_calls_fail_once_the_actor_is_gone() {
        let (handle, task) = spawn(1);
        task.abort();
        let _ = task.await;

        let err = handle.snapshot().await.unwrap_err();
        assert!(matches!(err, BuildQueueError::QueueClosed { owner } if owner == OWNER));
    }
}
