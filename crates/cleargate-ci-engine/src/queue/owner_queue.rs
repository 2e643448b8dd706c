//! Per-owner admission control.
//!
//! [`OwnerBuildQueue`] decides, for one owner, which requests run now, which
//! wait, which are merged into an existing request and which are turned
//! away. It assumes a single writer: the actor in
//! [`handle`](super::handle) owns one queue per owner and serializes every
//! mutating call.

use std::sync::Arc;

use crate::errors::BuildQueueError;
use crate::events::{BusEvent, EventBus, Outbox};
use crate::traits::{
    AccessManager, BuildController, BuildControllerFactory, BuildRequestRegistry,
    RejectionReason, ACTION_CANCEL_BUILD,
};
use crate::types::{BuildRequestEvent, BuildResultId, Owner, RequestId};

/// A request paired with the controller driving its build.
#[derive(Clone)]
pub struct ActiveBuild {
    request: BuildRequestEvent,
    controller: Arc<dyn BuildController>,
}

impl ActiveBuild {
    pub fn request(&self) -> &BuildRequestEvent {
        &self.request
    }

    pub fn controller(&self) -> &Arc<dyn BuildController> {
        &self.controller
    }

    /// Identity used to match completion notifications.
    pub fn build_result_id(&self) -> BuildResultId {
        self.controller.build_result_id()
    }
}

impl std::fmt::Debug for ActiveBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBuild")
            .field("request", &self.request)
            .field("build_result_id", &self.build_result_id())
            .finish()
    }
}

/// Collaborators shared by every owner queue.
#[derive(Clone)]
pub struct QueueCollaborators {
    pub factory: Arc<dyn BuildControllerFactory>,
    pub access: Arc<dyn AccessManager>,
    pub registry: Arc<dyn BuildRequestRegistry>,
    pub bus: EventBus,
}

/// Queued and active builds for one owner, capped at `max_active`
/// concurrently active builds.
///
/// Both lists hold the newest entry first. Queued requests activate from
/// the back, so admission is FIFO by arrival.
///
/// Every public handling method runs one pass and then flushes the pass's
/// deferred events to the bus, so a `BuildActivated` event is never seen
/// before the pass that caused it has finished.
pub struct OwnerBuildQueue {
    owner: Owner,
    max_active: usize,
    active: Vec<ActiveBuild>,
    queued: Vec<BuildRequestEvent>,
    stopped: bool,
    factory: Arc<dyn BuildControllerFactory>,
    access: Arc<dyn AccessManager>,
    registry: Arc<dyn BuildRequestRegistry>,
    outbox: Outbox,
}

impl OwnerBuildQueue {
    pub fn new(owner: Owner, max_active: usize, collaborators: QueueCollaborators) -> Self {
        Self {
            owner,
            max_active,
            active: Vec::new(),
            queued: Vec::new(),
            stopped: false,
            factory: collaborators.factory,
            access: collaborators.access,
            registry: collaborators.registry,
            outbox: collaborators.bus.outbox(),
        }
    }

    /// Admit a request: merge it into a replaceable queued or active request
    /// from the same source, activate it if below the cap, or queue it.
    ///
    /// A request for another owner is reported to the registry as rejected
    /// and returned as [`BuildQueueError::OwnerMismatch`].
    pub async fn handle_request(&mut self, request: BuildRequestEvent) -> Result<(), BuildQueueError> {
        let result = self.admit(request).await;
        self.outbox.flush();
        result
    }

    /// Release the active build with `build_result_id` and, if one was
    /// released, activate the oldest queued request.
    ///
    /// Returns whether a matching active build was found.
    ///
    /// Once the queue is stopped the oldest queued request is taken off the
    /// queue and rejected rather than started; it is not put back. The same
    /// holds when its controller fails to start, in which case the error is
    /// returned after the rejection has been reported.
    pub async fn handle_build_completed(
        &mut self,
        build_result_id: BuildResultId,
    ) -> Result<bool, BuildQueueError> {
        let result = self.complete(build_result_id).await;
        self.outbox.flush();
        result
    }

    /// Remove a queued (never an active) request after checking that
    /// `principal` may cancel it. Returns whether the request was found.
    pub fn cancel_queued_request(
        &mut self,
        request_id: RequestId,
        principal: &str,
    ) -> Result<bool, BuildQueueError> {
        let Some(pos) = self.queued.iter().position(|r| r.id() == request_id) else {
            return Ok(false);
        };

        self.access
            .ensure_permission(principal, ACTION_CANCEL_BUILD, &self.queued[pos])?;

        let request = self.queued.remove(pos);
        self.registry.request_cancelled(&request);
        tracing::debug!(owner = %self.owner, request_id = %request_id, principal, "queued request cancelled");
        Ok(true)
    }

    /// Stop activating builds. Active builds carry on; later activation
    /// attempts are rejected.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            tracing::info!(
                owner = %self.owner,
                active = self.active.len(),
                queued = self.queued.len(),
                "build queue stopped"
            );
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn active_build_count(&self) -> usize {
        self.active.len()
    }

    /// Copy of the active builds, newest first.
    pub fn active_builds_snapshot(&self) -> Vec<ActiveBuild> {
        self.active.clone()
    }

    pub fn queued_build_count(&self) -> usize {
        self.queued.len()
    }

    /// Copy of the queued requests, newest first.
    pub fn queued_builds_snapshot(&self) -> Vec<BuildRequestEvent> {
        self.queued.clone()
    }

    async fn admit(&mut self, request: BuildRequestEvent) -> Result<(), BuildQueueError> {
        if request.owner() != self.owner {
            self.registry
                .request_rejected(&request, RejectionReason::OwnerMismatch);
            return Err(BuildQueueError::OwnerMismatch {
                expected: self.owner,
                actual: request.owner(),
            });
        }

        if self.assimilate(&request).await {
            return Ok(());
        }

        if self.active.len() < self.max_active {
            return self.activate(request).await;
        }

        self.registry.request_queued(&request);
        tracing::debug!(
            owner = %self.owner,
            request_id = %request.id(),
            queued = self.queued.len() + 1,
            "request queued"
        );
        self.queued.insert(0, request);
        Ok(())
    }

    /// Fold `request` into an existing replaceable request from the same
    /// source. Queued requests are tried first, newest first; then active
    /// builds whose controller has not fixed its revision yet.
    async fn assimilate(&mut self, request: &BuildRequestEvent) -> bool {
        if let Some(existing) = self.queued.iter_mut().find(|q| q.can_be_replaced_by(request)) {
            existing.set_revision(request.revision().cloned());
            self.registry.request_assimilated(request, existing.id());
            return true;
        }

        for build in &self.active {
            if !build.request.can_be_replaced_by(request) {
                continue;
            }
            match build
                .controller
                .update_revision_if_not_fixed(request.revision())
                .await
            {
                Ok(true) => {
                    self.registry
                        .request_assimilated(request, build.request.id());
                    return true;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        owner = %self.owner,
                        request_id = %build.request.id(),
                        error = %e,
                        "unable to update active build revision"
                    );
                }
            }
        }

        false
    }

    async fn complete(&mut self, build_result_id: BuildResultId) -> Result<bool, BuildQueueError> {
        let Some(pos) = self
            .active
            .iter()
            .position(|b| b.build_result_id() == build_result_id)
        else {
            return Ok(false);
        };

        let finished = self.active.remove(pos);
        tracing::debug!(
            owner = %self.owner,
            request_id = %finished.request.id(),
            build_result_id = %build_result_id,
            "active build completed"
        );

        if let Some(next) = self.queued.pop() {
            self.activate(next).await?;
        }
        Ok(true)
    }

    async fn activate(&mut self, request: BuildRequestEvent) -> Result<(), BuildQueueError> {
        if self.stopped {
            self.registry
                .request_rejected(&request, RejectionReason::QueueStopped);
            return Ok(());
        }

        if self.active.iter().any(|b| b.request.id() == request.id()) {
            return Err(BuildQueueError::AlreadyActive {
                request_id: request.id(),
            });
        }

        let controller = self.factory.create(&request);
        let build_number = match controller.start().await {
            Ok(build_number) => build_number,
            Err(e) => {
                // The request is not in either list.
                self.registry
                    .request_rejected(&request, RejectionReason::ControllerFailed);
                tracing::warn!(
                    owner = %self.owner,
                    request_id = %request.id(),
                    error = %e,
                    "build controller failed to start"
                );
                return Err(e.into());
            }
        };
        self.registry.request_activated(&request, build_number);
        tracing::info!(
            owner = %self.owner,
            request_id = %request.id(),
            build_number,
            "build activated"
        );

        // Held until the current pass (possibly a completion) has finished.
        self.outbox.defer(BusEvent::BuildActivated {
            request: request.clone(),
            build_number,
        });
        self.active.insert(0, ActiveBuild { request, controller });
        Ok(())
    }
}

impl std::fmt::Debug for OwnerBuildQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerBuildQueue")
            .field("owner", &self.owner)
            .field("max_active", &self.max_active)
            .field("active", &self.active.len())
            .field("queued", &self.queued.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}
