//! One slot of the fragmenter's session pool.
//!
//! A [`Session`] binds a device to a reassembly worker for the lifetime of one
//! fragmented message. The worker is created lazily on the first fragment and
//! torn down when it exits, after which the slot can be claimed again.

use std::{
    num::NonZeroUsize,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use futures::FutureExt;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    codec::RuleId,
    config::{AckMode, Direction, FragmentationProfile},
    device::DeviceId,
    error::{GatewayError, Result},
    event::{EventSink, GatewayEvent},
    fragmenter::Associations,
    link::Link,
    metrics,
    queue::{FragmentReceiver, FragmentSender, QueuedFragment, fragment_queue},
    reassembly::{
        DropReason,
        FaultPolicy,
        ReassemblyEvent,
        ReassemblyMachine,
        ReassemblyWorker,
        WorkerExit,
    },
};

/// Factory producing a fresh fault policy for each session.
pub type FaultPolicyFactory = Arc<dyn Fn() -> Box<dyn FaultPolicy> + Send + Sync>;

/// Resources shared by every session of a pool.
pub(crate) struct SessionContext {
    pub(crate) link: Arc<dyn Link>,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown: CancellationToken,
    pub(crate) events: Option<EventSink>,
    pub(crate) associations: Arc<Associations>,
    pub(crate) fault_policy: Option<FaultPolicyFactory>,
    pub(crate) queue_capacity: NonZeroUsize,
}

struct WorkerHandle {
    sender: FragmentSender,
    shutdown: CancellationToken,
}

/// A pool slot that reassembles one message at a time.
pub struct Session {
    slot: usize,
    direction: Direction,
    profile: FragmentationProfile,
    mode: AckMode,
    running: AtomicBool,
    first_message: AtomicBool,
    device: Mutex<Option<DeviceId>>,
    worker: Mutex<Option<WorkerHandle>>,
    ctx: Arc<SessionContext>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub(crate) fn new(
        slot: usize,
        direction: Direction,
        profile: FragmentationProfile,
        mode: AckMode,
        ctx: Arc<SessionContext>,
    ) -> Self {
        Self {
            slot,
            direction,
            profile,
            mode,
            running: AtomicBool::new(false),
            first_message: AtomicBool::new(true),
            device: Mutex::new(None),
            worker: Mutex::new(None),
            ctx,
        }
    }

    /// Pool index of this session.
    #[must_use]
    pub fn slot(&self) -> usize { self.slot }

    /// Link direction this slot reassembles.
    #[must_use]
    pub fn direction(&self) -> Direction { self.direction }

    /// Report whether the slot is claimed by a device.
    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::Acquire) }

    /// Report whether the next fragment will start a new worker.
    #[must_use]
    pub fn is_first_message(&self) -> bool { self.first_message.load(Ordering::Acquire) }

    /// Device currently bound to the slot.
    #[must_use]
    pub fn device(&self) -> Option<DeviceId> { lock(&self.device).clone() }

    /// Claim the slot for `device` if it is free.
    pub(crate) fn try_claim(&self, device: &DeviceId) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *lock(&self.device) = Some(device.clone());
        metrics::inc_sessions();
        true
    }

    /// Queue a fragment for the session's worker, starting the worker on the
    /// first call.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionNotRunning`] if the slot is not bound
    /// to `device`, or [`GatewayError::Queue`] if the worker's queue refuses
    /// the fragment.
    pub fn process_message(
        self: &Arc<Self>,
        device: &DeviceId,
        rule_id: RuleId,
        buffer: Bytes,
    ) -> Result<()> {
        let mut worker = lock(&self.worker);
        let bound = lock(&self.device).as_ref() == Some(device);
        if !self.is_running() || !bound {
            return Err(GatewayError::SessionNotRunning {
                slot: self.slot,
                device: device.clone(),
            });
        }
        if self.first_message.swap(false, Ordering::AcqRel) {
            *worker = Some(self.spawn_worker(device.clone()));
        }
        let Some(handle) = worker.as_ref() else {
            return Err(GatewayError::SessionNotRunning {
                slot: self.slot,
                device: device.clone(),
            });
        };
        debug!(slot = self.slot, %device, %rule_id, len = buffer.len(), "queueing fragment");
        handle.sender.push(rule_id, buffer)?;
        Ok(())
    }

    fn spawn_worker(self: &Arc<Self>, device: DeviceId) -> WorkerHandle {
        let (sender, receiver) = fragment_queue(self.ctx.queue_capacity);
        let shutdown = self.ctx.shutdown.child_token();
        let mut machine = ReassemblyMachine::new(device.clone(), self.profile, self.mode);
        if let Some(factory) = &self.ctx.fault_policy {
            machine = machine.with_fault_policy(factory());
        }
        let worker = ReassemblyWorker::new(
            machine,
            receiver,
            Arc::clone(&self.ctx.link),
            shutdown.clone(),
        )
        .with_events(self.ctx.events.clone());

        info!(
            slot = self.slot,
            %device,
            direction = %self.direction,
            mode = %self.mode,
            "starting reassembly session"
        );
        let session = Arc::clone(self);
        self.ctx.tracker.spawn(async move {
            let (exit, queue) = match AssertUnwindSafe(worker.run()).catch_unwind().await {
                Ok((exit, queue)) => (exit, Some(queue)),
                Err(panic) => {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .copied()
                        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                        .unwrap_or("<non-string panic>");
                    error!(panic = %panic_msg, %device, "reassembly worker panicked");
                    (WorkerExit::Panicked, None)
                }
            };
            session.on_state_machine_ended(exit, queue);
        });
        WorkerHandle { sender, shutdown }
    }

    /// Tear the session down after its worker exits.
    ///
    /// Fragments still queued belong to the device's next message. When the
    /// message ended normally and the device is still associated with this
    /// slot they go to a fresh worker on the same slot; otherwise each one is
    /// reported as dropped. On teardown the device association is dropped
    /// before the slot is marked free, so no caller can claim a slot that is
    /// still associated.
    pub(crate) fn on_state_machine_ended(
        self: &Arc<Self>,
        exit: WorkerExit,
        queue: Option<FragmentReceiver>,
    ) {
        let mut worker = lock(&self.worker);
        let pending: Vec<QueuedFragment> = queue
            .map(|mut queue| std::iter::from_fn(|| queue.try_recv()).collect())
            .unwrap_or_default();
        if let Some(handle) = worker.take() {
            handle.shutdown.cancel();
        }
        metrics::inc_finished(exit.as_str());

        if let Some(device) = self.restart_target(exit, &pending) {
            info!(
                slot = self.slot,
                %device,
                pending = pending.len(),
                "restarting session for queued fragments"
            );
            let handle = self.spawn_worker(device.clone());
            for QueuedFragment { rule_id, buffer } in pending {
                if let Err(err) = handle.sender.push(rule_id, buffer) {
                    warn!(slot = self.slot, %device, error = %err, "requeue failed");
                    self.report_dropped(&device);
                }
            }
            *worker = Some(handle);
            return;
        }

        let device = lock(&self.device).take();
        if let Some(device) = &device {
            self.ctx.associations.release(device, self.slot);
            for _ in &pending {
                self.report_dropped(device);
            }
        }
        self.first_message.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);
        drop(worker);

        metrics::dec_sessions();
        info!(slot = self.slot, device = ?device, exit = exit.as_str(), "session released");
        if let (Some(sink), Some(device)) = (&self.ctx.events, device) {
            let released = GatewayEvent::SessionReleased {
                device,
                slot: self.slot,
                exit,
            };
            if sink.send(released).is_err() {
                debug!(slot = self.slot, "event observer gone");
            }
        }
    }

    /// Device whose queued fragments should start a new session on this slot.
    fn restart_target(&self, exit: WorkerExit, pending: &[QueuedFragment]) -> Option<DeviceId> {
        if pending.is_empty()
            || !matches!(exit, WorkerExit::Completed | WorkerExit::Aborted)
            || self.ctx.shutdown.is_cancelled()
        {
            return None;
        }
        let device = lock(&self.device).clone()?;
        (self.ctx.associations.get(&device) == Some(self.slot)).then_some(device)
    }

    fn report_dropped(&self, device: &DeviceId) {
        warn!(slot = self.slot, %device, "dropping fragment queued after session end");
        metrics::inc_errors("session_ended");
        if let Some(sink) = &self.ctx.events {
            let dropped = GatewayEvent::Reassembly {
                device: device.clone(),
                event: ReassemblyEvent::FragmentDropped {
                    reason: DropReason::SessionEnded,
                },
            };
            if sink.send(dropped).is_err() {
                debug!(slot = self.slot, "event observer gone");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("slot", &self.slot)
            .field("direction", &self.direction)
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .field("first_message", &self.is_first_message())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bytes::Bytes;
    use rstest::rstest;
    use tracing_test::traced_test;

    use crate::{
        codec::{Fragment, RuleId},
        device::DeviceId,
        event::{GatewayEvent, event_channel},
        fragmenter::Fragmenter,
        reassembly::{FaultPolicy, ReceiverState, WorkerExit},
        ttn::JsonLinesLink,
    };

    fn panicking_policy() -> Box<dyn FaultPolicy> {
        Box::new(|_: &Fragment, _: ReceiverState| -> bool { panic!("boom") })
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn worker_panic_releases_the_slot() {
        let (sink, mut events) = event_channel();
        let fragmenter = Fragmenter::builder(Arc::new(JsonLinesLink::new("app", Vec::new())))
            .pool_size(1)
            .event_sink(sink)
            .fault_policy(panicking_policy)
            .build()
            .expect("valid configuration");
        let device = DeviceId::from("fragile");

        fragmenter
            .dispatch(device.clone(), RuleId::new(20), Bytes::from_static(&[0]))
            .expect("free slot");
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("release in time")
            .expect("stream open");
        assert_eq!(
            event,
            GatewayEvent::SessionReleased {
                device: device.clone(),
                slot: 0,
                exit: WorkerExit::Panicked,
            }
        );
        assert!(logs_contain("reassembly worker panicked"));

        let session = fragmenter.session(0).expect("slot 0");
        assert!(!session.is_running());
        assert!(session.is_first_message());
        assert!(session.device().is_none());
        assert!(fragmenter.session_for(&device).is_none());
        fragmenter.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn unbound_device_is_refused() {
        let fragmenter = Fragmenter::builder(Arc::new(JsonLinesLink::new("app", Vec::new())))
            .build()
            .expect("valid configuration");
        let session = fragmenter.session(0).expect("slot 0");
        let err = session
            .process_message(&DeviceId::from("stranger"), RuleId::new(20), Bytes::from_static(&[0]))
            .expect_err("slot is not claimed");
        assert!(matches!(err, crate::error::GatewayError::SessionNotRunning { slot: 0, .. }));
    }
}
