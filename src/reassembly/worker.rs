//! Async task driving one [`ReassemblyMachine`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Outcome, ReassemblyMachine, ReceiverState};
use crate::{
    event::{EventSink, GatewayEvent},
    link::Link,
    metrics,
    queue::{FragmentReceiver, QueuedFragment},
};

/// Why a worker stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerExit {
    /// The message was reassembled.
    Completed,
    /// The session was aborted.
    Aborted,
    /// The shutdown token fired.
    Cancelled,
    /// Every queue sender was dropped.
    QueueClosed,
    /// The worker panicked.
    Panicked,
}

impl WorkerExit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkerExit::Completed => "completed",
            WorkerExit::Aborted => "aborted",
            WorkerExit::Cancelled => "cancelled",
            WorkerExit::QueueClosed => "queue_closed",
            WorkerExit::Panicked => "panicked",
        }
    }
}

/// Consumes a session's fragment queue and sends the resulting ACKs.
pub struct ReassemblyWorker {
    machine: ReassemblyMachine,
    queue: FragmentReceiver,
    link: Arc<dyn Link>,
    events: Option<EventSink>,
    shutdown: CancellationToken,
}

impl ReassemblyWorker {
    #[must_use]
    pub fn new(
        machine: ReassemblyMachine,
        queue: FragmentReceiver,
        link: Arc<dyn Link>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            machine,
            queue,
            link,
            events: None,
            shutdown,
        }
    }

    /// Publish the machine's events to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: Option<EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Run until the session ends, is aborted, or `shutdown` fires.
    ///
    /// The machine and its tile storage are dropped before this returns. The
    /// queue is handed back because fragments may have been accepted behind
    /// the one that ended the session.
    pub async fn run(mut self) -> (WorkerExit, FragmentReceiver) {
        debug!(
            device = %self.machine.device(),
            mode = %self.machine.mode(),
            mtu = self.link.mtu(true),
            "reassembly worker started"
        );
        let exit = loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break WorkerExit::Cancelled,

                next = self.queue.recv() => match next {
                    Some(QueuedFragment { rule_id, buffer }) => {
                        let outcome = self.machine.handle(rule_id, buffer);
                        self.deliver(outcome).await;
                        match self.machine.state() {
                            ReceiverState::Ended => break WorkerExit::Completed,
                            ReceiverState::TerminateAll => break WorkerExit::Aborted,
                            _ => {}
                        }
                    }
                    None => break WorkerExit::QueueClosed,
                },
            }
        };
        info!(
            device = %self.machine.device(),
            exit = exit.as_str(),
            pending = self.queue.len(),
            "reassembly worker stopped"
        );
        (exit, self.queue)
    }

    async fn deliver(&mut self, outcome: Outcome) {
        let device = self.machine.device();
        for ack in outcome.acks {
            let rule_id = ack.rule_id();
            if let Err(err) = self
                .link
                .send_downlink(device, rule_id, ack.into_bytes())
                .await
            {
                warn!(%device, %rule_id, error = %err, "failed to send ack");
                metrics::inc_errors("link");
            }
        }
        let Some(sink) = self.events.as_ref() else {
            return;
        };
        for event in outcome.events {
            let published = sink.send(GatewayEvent::Reassembly {
                device: device.clone(),
                event,
            });
            if published.is_err() {
                debug!(%device, "event observer gone");
                self.events = None;
                return;
            }
        }
    }
}
