/// Transfer queue, the chunked send engine
///
/// One FIFO shared by every destination. Only the head task is ever drained;
/// the rest wait their turn even when their destination is idle. Keeping a
/// single queue preserves the global completion order callers rely on, at the
/// cost of head-of-line blocking across peers.
///
/// The queue is a synchronous state machine. It never sleeps and never calls
/// itself back: readiness, pacing expiry and disconnects arrive as method
/// calls from the owning executor (see [`super::service`]).

use super::fragment::Fragmenter;
use super::task::{Pacing, TransferId, TransferTask};
use crate::config::TransferConfig;
use crate::transport::abstraction::{BleLink, PeerId, SendOutcome, WriteMode};
use crate::TransferError;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Where the engine is parked between calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Queue empty
    Idle,
    /// Inside the drain loop
    Draining,
    /// Head task suspended until `peer` signals readiness
    AwaitingReady { peer: PeerId },
    /// Head task sleeping off a pacing delay
    Pacing { peer: PeerId, delay: Duration },
}

/// What the driver has to do after a call returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStatus {
    /// Nothing queued
    Idle,
    /// Wait for a readiness signal from this peer
    AwaitingReady(PeerId),
    /// Call [`TransferQueue::on_pacing_elapsed`] after this delay
    Paced(Duration),
}

/// FIFO transfer engine over a [`BleLink`]
pub struct TransferQueue<L: BleLink> {
    link: L,
    fragmenter: Fragmenter,
    default_pacing: Option<Pacing>,
    tasks: VecDeque<TransferTask>,
    state: EngineState,
    pending_delay: Option<Duration>,
    next_id: u64,
}

impl<L: BleLink> TransferQueue<L> {
    /// Create an engine driving `link`
    pub fn new(link: L, config: &TransferConfig) -> Self {
        Self {
            link,
            fragmenter: Fragmenter::new(config.end_marker.clone()),
            default_pacing: config.default_pacing,
            tasks: VecDeque::new(),
            state: EngineState::Idle,
            pending_delay: None,
            next_id: 1,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// `(id, cursor, payload length)` of the head task
    pub fn head_progress(&self) -> Option<(TransferId, usize, usize)> {
        self.tasks
            .front()
            .map(|task| (task.id(), task.cursor(), task.payload().len()))
    }

    /// Pacing delay entered since the last call, for timer-driven executors
    pub fn take_pacing_delay(&mut self) -> Option<Duration> {
        self.pending_delay.take()
    }

    /// Append a task.
    ///
    /// A destination outside the connected set is rejected without queueing:
    /// the task's callback fires with [`TransferError::NotConnected`] before
    /// this returns. Otherwise an idle engine starts draining at once.
    pub fn enqueue(&mut self, mut task: TransferTask) -> Result<TransferId, TransferError> {
        if !self.link.is_connected(task.destination()) {
            warn!(
                "Rejecting transfer to {}: peer not connected",
                task.destination()
            );
            task.finish(Err(TransferError::NotConnected));
            return Err(TransferError::NotConnected);
        }

        if task.pacing().is_none() {
            task = task.with_pacing(self.default_pacing);
        }
        let id = TransferId(self.next_id);
        self.next_id += 1;
        task.id = id;

        debug!(
            "Queued transfer {} ({} bytes) to {}, depth {}",
            id,
            task.payload().len(),
            task.destination(),
            self.tasks.len() + 1
        );
        self.tasks.push_back(task);

        if self.state == EngineState::Idle {
            self.drain();
        }
        Ok(id)
    }

    /// Readiness signal from the link. Resumes only when the head task is
    /// suspended on this same peer; anything else is dropped.
    pub fn on_link_ready(&mut self, peer: &PeerId) -> DrainStatus {
        match &self.state {
            EngineState::AwaitingReady { peer: waiting } if waiting == peer => {
                trace!("Link ready for {}, resuming", peer);
                self.drain()
            }
            state => {
                trace!("Ignoring readiness from {} in state {:?}", peer, state);
                self.status()
            }
        }
    }

    /// The pacing delay announced by [`DrainStatus::Paced`] has passed
    pub fn on_pacing_elapsed(&mut self) -> DrainStatus {
        if matches!(self.state, EngineState::Pacing { .. }) {
            self.drain()
        } else {
            self.status()
        }
    }

    /// Fail every task bound for `peer`, in enqueue order. If the head was
    /// among them the next head starts draining.
    pub fn on_peer_disconnected(&mut self, peer: &PeerId) -> DrainStatus {
        let head_removed = self
            .tasks
            .front()
            .map(|task| task.destination() == peer)
            .unwrap_or(false);

        let (removed, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.destination() == peer);
        self.tasks = kept;

        if !removed.is_empty() {
            info!(
                "Peer {} disconnected, failing {} queued transfer(s)",
                peer,
                removed.len()
            );
        }
        for task in removed {
            task.finish(Err(TransferError::Disconnected));
        }

        if head_removed {
            self.state = EngineState::Idle;
            self.pending_delay = None;
            self.drain()
        } else {
            self.status()
        }
    }

    /// Fail everything still queued; used when the executor stops
    pub fn shutdown(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.tasks);
        let count = tasks.len();
        for task in tasks {
            task.finish(Err(TransferError::Shutdown));
        }
        self.state = EngineState::Idle;
        self.pending_delay = None;
        count
    }

    fn status(&self) -> DrainStatus {
        match &self.state {
            EngineState::AwaitingReady { peer } => DrainStatus::AwaitingReady(peer.clone()),
            EngineState::Pacing { delay, .. } => DrainStatus::Paced(*delay),
            EngineState::Idle | EngineState::Draining => DrainStatus::Idle,
        }
    }

    /// Feed head-task packets to the link until it pushes back, a pacing
    /// pause is due, or the queue runs dry. Finishing a task moves straight
    /// on to the next head within the same loop.
    fn drain(&mut self) -> DrainStatus {
        self.state = EngineState::Draining;

        loop {
            let Some(head) = self.tasks.front_mut() else {
                self.state = EngineState::Idle;
                return DrainStatus::Idle;
            };
            let peer = head.destination().clone();
            if !self.link.is_connected(&peer) {
                debug!("Destination {} of transfer {} is gone", peer, head.id());
                self.finish_head(Err(TransferError::Disconnected));
                continue;
            }
            let max_packet_size = self.link.max_packet_size(&peer);

            let packet = match self
                .fragmenter
                .next_packet(head.payload(), head.offset(), max_packet_size)
            {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    let stream_len = self.fragmenter.stream_len(head.payload());
                    let result = if head.offset() == stream_len {
                        Ok(())
                    } else {
                        Err(TransferError::Internal(format!(
                            "fragmenter exhausted at offset {} of {}",
                            head.offset(),
                            stream_len
                        )))
                    };
                    self.finish_head(result);
                    continue;
                }
                Err(e) => {
                    warn!("Cannot cut packet for {} (max {}): {}", peer, max_packet_size, e);
                    self.finish_head(Err(e.into()));
                    continue;
                }
            };

            if let Some(delay) = head.pacing_due() {
                head.mark_paced();
                debug!("Pacing transfer {} for {:?}", head.id(), delay);
                self.state = EngineState::Pacing { peer, delay };
                self.pending_delay = Some(delay);
                return DrainStatus::Paced(delay);
            }

            match self.link.try_send(&peer, &packet) {
                SendOutcome::Accepted => {
                    head.advance(packet.len());
                    trace!(
                        "Transfer {} sent {} bytes, cursor {}/{}",
                        head.id(),
                        packet.len(),
                        head.cursor(),
                        head.payload().len()
                    );
                    if self.link.capabilities(&peer).write_mode == WriteMode::OnePerReady {
                        self.state = EngineState::AwaitingReady { peer: peer.clone() };
                        return DrainStatus::AwaitingReady(peer);
                    }
                }
                SendOutcome::NotReady => {
                    trace!("Link to {} not ready, suspending {}", peer, head.id());
                    self.state = EngineState::AwaitingReady { peer: peer.clone() };
                    return DrainStatus::AwaitingReady(peer);
                }
                SendOutcome::Failed(reason) => {
                    warn!("Transport error sending {} to {}: {}", head.id(), peer, reason);
                    self.finish_head(Err(TransferError::Transport(reason)));
                }
            }
        }
    }

    fn finish_head(&mut self, result: Result<(), TransferError>) {
        if let Some(task) = self.tasks.pop_front() {
            if result.is_ok() {
                debug!("Transfer {} to {} complete", task.id(), task.destination());
            }
            task.finish(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::abstraction::{LinkCapabilities, MockBleLink};
    use crate::transport::ble::fragment::EndMarker;
    use crate::transport::ble::task::TransferOutcome;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Link that records packets and follows a scripted acceptance policy
    struct ScriptedLink {
        mtu: usize,
        connected: HashSet<PeerId>,
        write_mode: WriteMode,
        /// Packets accepted before the next `NotReady`; `None` = unlimited
        budget: Option<usize>,
        sent: Vec<(PeerId, Vec<u8>)>,
    }

    impl ScriptedLink {
        fn new(mtu: usize, peers: &[&str]) -> Self {
            Self {
                mtu,
                connected: peers.iter().map(|p| PeerId::from(*p)).collect(),
                write_mode: WriteMode::BackToBack,
                budget: None,
                sent: Vec::new(),
            }
        }
    }

    impl BleLink for ScriptedLink {
        fn max_packet_size(&self, _peer: &PeerId) -> usize {
            self.mtu
        }

        fn try_send(&mut self, peer: &PeerId, packet: &[u8]) -> SendOutcome {
            match self.budget {
                Some(0) => SendOutcome::NotReady,
                Some(ref mut n) => {
                    *n -= 1;
                    self.sent.push((peer.clone(), packet.to_vec()));
                    SendOutcome::Accepted
                }
                None => {
                    self.sent.push((peer.clone(), packet.to_vec()));
                    SendOutcome::Accepted
                }
            }
        }

        fn is_connected(&self, peer: &PeerId) -> bool {
            self.connected.contains(peer)
        }

        fn capabilities(&self, _peer: &PeerId) -> LinkCapabilities {
            LinkCapabilities::new(self.write_mode)
        }
    }

    type Outcomes = Arc<Mutex<Vec<TransferOutcome>>>;

    fn task(payload: &[u8], peer: &str, outcomes: &Outcomes) -> TransferTask {
        let sink = Arc::clone(outcomes);
        TransferTask::new(payload.to_vec(), PeerId::from(peer), move |outcome| {
            sink.lock().unwrap().push(outcome);
        })
    }

    fn results(outcomes: &Outcomes) -> Vec<(Vec<u8>, Result<(), TransferError>)> {
        outcomes
            .lock()
            .unwrap()
            .iter()
            .map(|o| (o.payload.clone(), o.result.clone()))
            .collect()
    }

    #[test]
    fn test_fifty_bytes_three_packets() {
        let outcomes = Outcomes::default();
        let mut queue =
            TransferQueue::new(ScriptedLink::new(20, &["a"]), &TransferConfig::default());

        queue.enqueue(task(&[7u8; 50], "a", &outcomes)).expect("enqueue");

        let lengths: Vec<usize> = queue.link().sent.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(lengths, vec![20, 20, 10]);
        assert_eq!(results(&outcomes), vec![(vec![7u8; 50], Ok(()))]);
        assert_eq!(queue.state(), &EngineState::Idle);
    }

    #[test]
    fn test_cursor_progression_one_per_ready() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(20, &["a"]);
        link.write_mode = WriteMode::OnePerReady;
        let mut queue = TransferQueue::new(link, &TransferConfig::default());
        let peer = PeerId::from("a");

        let id = queue.enqueue(task(&[1u8; 50], "a", &outcomes)).expect("enqueue");
        assert_eq!(queue.head_progress(), Some((id, 20, 50)));

        assert_eq!(queue.on_link_ready(&peer), DrainStatus::AwaitingReady(peer.clone()));
        assert_eq!(queue.head_progress(), Some((id, 40, 50)));

        queue.on_link_ready(&peer);
        assert_eq!(queue.head_progress(), Some((id, 50, 50)));
        assert!(outcomes.lock().unwrap().is_empty());

        assert_eq!(queue.on_link_ready(&peer), DrainStatus::Idle);
        assert_eq!(results(&outcomes), vec![(vec![1u8; 50], Ok(()))]);
    }

    #[test]
    fn test_not_connected_rejected_synchronously() {
        let outcomes = Outcomes::default();
        let mut queue =
            TransferQueue::new(ScriptedLink::new(20, &["a"]), &TransferConfig::default());

        let result = queue.enqueue(task(b"x", "ghost", &outcomes));

        assert_eq!(result, Err(TransferError::NotConnected));
        assert_eq!(results(&outcomes), vec![(b"x".to_vec(), Err(TransferError::NotConnected))]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_not_ready_suspends_without_advancing() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(10, &["a"]);
        link.budget = Some(1);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());
        let peer = PeerId::from("a");

        let id = queue.enqueue(task(&[0u8; 30], "a", &outcomes)).expect("enqueue");
        assert_eq!(queue.state(), &EngineState::AwaitingReady { peer: peer.clone() });
        assert_eq!(queue.head_progress(), Some((id, 10, 30)));

        // Readiness from another peer is dropped
        queue.on_link_ready(&PeerId::from("b"));
        assert_eq!(queue.head_progress(), Some((id, 10, 30)));

        queue.link_mut().budget = None;
        assert_eq!(queue.on_link_ready(&peer), DrainStatus::Idle);
        assert_eq!(results(&outcomes).len(), 1);
    }

    #[test]
    fn test_fifo_across_destinations() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(4, &["a", "b"]);
        link.budget = Some(0);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"first", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"second", "b", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"third", "a", &outcomes)).expect("enqueue");
        assert_eq!(queue.len(), 3);

        // b is idle but must wait behind a's head task
        queue.link_mut().budget = None;
        queue.on_link_ready(&PeerId::from("b"));
        assert!(outcomes.lock().unwrap().is_empty());

        queue.on_link_ready(&PeerId::from("a"));
        let payloads: Vec<Vec<u8>> = results(&outcomes).into_iter().map(|(p, _)| p).collect();
        assert_eq!(payloads, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn test_stall_resolved_only_by_disconnect() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(4, &["a"]);
        // first task fully, then one packet of the second
        link.budget = Some(3);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());
        let peer = PeerId::from("a");

        queue.enqueue(task(b"12345678", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"abcdefgh", "a", &outcomes)).expect("enqueue");

        assert_eq!(results(&outcomes), vec![(b"12345678".to_vec(), Ok(()))]);
        assert_eq!(queue.state(), &EngineState::AwaitingReady { peer: peer.clone() });

        assert_eq!(queue.on_peer_disconnected(&peer), DrainStatus::Idle);
        assert_eq!(
            results(&outcomes),
            vec![
                (b"12345678".to_vec(), Ok(())),
                (b"abcdefgh".to_vec(), Err(TransferError::Disconnected)),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_disconnect_fails_only_that_peer_in_order() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(4, &["a", "b"]);
        link.budget = Some(1);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"a1-long", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"b1", "b", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"a2", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"b2", "b", &outcomes)).expect("enqueue");

        queue.link_mut().budget = None;
        queue.on_peer_disconnected(&PeerId::from("a"));

        assert_eq!(
            results(&outcomes),
            vec![
                (b"a1-long".to_vec(), Err(TransferError::Disconnected)),
                (b"a2".to_vec(), Err(TransferError::Disconnected)),
                (b"b1".to_vec(), Ok(())),
                (b"b2".to_vec(), Ok(())),
            ]
        );
    }

    #[test]
    fn test_disconnect_of_pending_peer_keeps_head_suspended() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(4, &["a", "b"]);
        link.budget = Some(0);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"head", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"pending", "b", &outcomes)).expect("enqueue");

        let status = queue.on_peer_disconnected(&PeerId::from("b"));
        assert_eq!(status, DrainStatus::AwaitingReady(PeerId::from("a")));
        assert_eq!(
            results(&outcomes),
            vec![(b"pending".to_vec(), Err(TransferError::Disconnected))]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_transport_error_fails_task_and_continues() {
        let outcomes = Outcomes::default();
        let mut link = MockBleLink::new();
        link.expect_is_connected().return_const(true);
        link.expect_max_packet_size().return_const(8usize);
        link.expect_capabilities().return_const(LinkCapabilities::default());
        link.expect_try_send().returning(|peer, _| {
            if peer.as_str() == "broken" {
                SendOutcome::Failed("GATT write error 0x85".to_string())
            } else {
                SendOutcome::Accepted
            }
        });
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"doomed", "broken", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"fine", "ok", &outcomes)).expect("enqueue");

        assert_eq!(
            results(&outcomes),
            vec![
                (
                    b"doomed".to_vec(),
                    Err(TransferError::Transport("GATT write error 0x85".to_string()))
                ),
                (b"fine".to_vec(), Ok(())),
            ]
        );
    }

    #[test]
    fn test_zero_packet_size_is_internal_error() {
        let outcomes = Outcomes::default();
        let mut link = MockBleLink::new();
        link.expect_is_connected().return_const(true);
        link.expect_max_packet_size().return_const(0usize);
        link.expect_try_send().never();
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"data", "a", &outcomes)).expect("enqueue");

        let got = results(&outcomes);
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0].1, Err(TransferError::Internal(_))));
    }

    #[test]
    fn test_mtu_renegotiation_mid_transfer() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(10, &["a"]);
        link.budget = Some(1);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());
        let payload: Vec<u8> = (0u8..35).collect();

        queue.enqueue(task(&payload, "a", &outcomes)).expect("enqueue");
        queue.link_mut().mtu = 20;
        queue.link_mut().budget = None;
        queue.on_link_ready(&PeerId::from("a"));

        let lengths: Vec<usize> = queue.link().sent.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(lengths, vec![10, 20, 5]);
        let sent: Vec<u8> = queue.link().sent.iter().flat_map(|(_, p)| p.clone()).collect();
        assert_eq!(sent, payload);
    }

    #[test]
    fn test_empty_payload_with_marker() {
        let outcomes = Outcomes::default();
        let config = TransferConfig::default().with_end_marker(EndMarker::new(b"END".to_vec()));
        let mut queue = TransferQueue::new(ScriptedLink::new(20, &["a"]), &config);

        queue.enqueue(task(b"", "a", &outcomes)).expect("enqueue");

        assert_eq!(queue.link().sent, vec![(PeerId::from("a"), b"END".to_vec())]);
        assert_eq!(results(&outcomes), vec![(Vec::new(), Ok(()))]);
    }

    #[test]
    fn test_pacing_pauses_on_boundaries() {
        let outcomes = Outcomes::default();
        let config = TransferConfig::default().with_default_pacing(Some(Pacing::new(15, 20)));
        let mut queue = TransferQueue::new(ScriptedLink::new(10, &["a"]), &config);

        queue.enqueue(task(&[0u8; 45], "a", &outcomes)).expect("enqueue");
        assert_eq!(queue.link().sent.len(), 2);
        assert_eq!(queue.take_pacing_delay(), Some(Duration::from_millis(15)));
        assert_eq!(queue.take_pacing_delay(), None);

        // readiness does not cut a pause short
        queue.on_link_ready(&PeerId::from("a"));
        assert_eq!(queue.link().sent.len(), 2);

        assert_eq!(queue.on_pacing_elapsed(), DrainStatus::Paced(Duration::from_millis(15)));
        assert_eq!(queue.link().sent.len(), 4);

        assert_eq!(queue.on_pacing_elapsed(), DrainStatus::Idle);
        assert_eq!(queue.link().sent.len(), 5);
        assert_eq!(results(&outcomes).len(), 1);
    }

    #[test]
    fn test_pause_ending_after_peer_left_fails_with_disconnect() {
        let outcomes = Outcomes::default();
        let config = TransferConfig::default().with_default_pacing(Some(Pacing::new(15, 20)));
        let mut queue = TransferQueue::new(ScriptedLink::new(10, &["a", "b"]), &config);

        queue.enqueue(task(&[7u8; 45], "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"ok", "b", &outcomes)).expect("enqueue");
        assert!(matches!(queue.state(), EngineState::Pacing { .. }));

        // the timer fires before the disconnect event is handled
        queue.link_mut().connected.remove(&PeerId::from("a"));
        assert_eq!(queue.on_pacing_elapsed(), DrainStatus::Idle);

        assert_eq!(
            results(&outcomes),
            vec![
                (vec![7u8; 45], Err(TransferError::Disconnected)),
                (b"ok".to_vec(), Ok(())),
            ]
        );
        assert_eq!(queue.link().sent.len(), 3);
        assert_eq!(queue.on_peer_disconnected(&PeerId::from("a")), DrainStatus::Idle);
    }

    #[test]
    fn test_spurious_signals_are_harmless() {
        let outcomes = Outcomes::default();
        let mut queue =
            TransferQueue::new(ScriptedLink::new(10, &["a"]), &TransferConfig::default());
        let peer = PeerId::from("a");

        assert_eq!(queue.on_link_ready(&peer), DrainStatus::Idle);
        assert_eq!(queue.on_pacing_elapsed(), DrainStatus::Idle);
        assert_eq!(queue.on_peer_disconnected(&peer), DrainStatus::Idle);

        queue.enqueue(task(b"ok", "a", &outcomes)).expect("enqueue");
        queue.on_link_ready(&peer);
        queue.on_link_ready(&peer);
        assert_eq!(results(&outcomes).len(), 1);
    }

    #[test]
    fn test_shutdown_fails_queued_tasks() {
        let outcomes = Outcomes::default();
        let mut link = ScriptedLink::new(10, &["a"]);
        link.budget = Some(0);
        let mut queue = TransferQueue::new(link, &TransferConfig::default());

        queue.enqueue(task(b"one", "a", &outcomes)).expect("enqueue");
        queue.enqueue(task(b"two", "a", &outcomes)).expect("enqueue");

        assert_eq!(queue.shutdown(), 2);
        assert!(results(&outcomes)
            .iter()
            .all(|(_, r)| r == &Err(TransferError::Shutdown)));
        assert_eq!(queue.state(), &EngineState::Idle);
    }
}
