//! The background dispatch worker.
//!
//! One tokio task owns the in-memory queue and drains it a request at
//! a time. Application-facing calls (`enqueue`, `signal`, `stop`) only
//! send on a channel or flip an atomic, so they are safe from any
//! thread and never block the caller.

use crate::{AuthStatusProvider, PayloadFinalizer, Response, Transport};
use playkit_cache::{CachedRequest, RequestCache};
use playkit_core::{
    AuthStatus, Completion, DeliveryOutcome, HttpMethod, Payload, Request, RequestSink,
    ServiceCategory,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not yet draining. Enqueued requests wait.
    Idle,
    /// A live task is draining the queue.
    Running,
    /// No further processing. In-memory queue contents are abandoned;
    /// persisted rows remain recoverable on the next start.
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retry ceiling. `0` means unlimited retries.
    pub max_retry_count: u32,
    /// Pause after a failed or deferred attempt before the next pull,
    /// so a lone failing request cannot hot-loop.
    pub retry_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Commands accepted by the drain task.
enum Command {
    Enqueue { item: CachedRequest, at_front: bool },
    /// Wake a blocked worker so it re-examines deferred requests.
    Signal,
}

/// Handle to the dispatch worker. Cloning is cheap; all clones share
/// the same queue and state.
#[derive(Clone)]
pub struct DispatchWorker {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<RequestCache>,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthStatusProvider>,
    finalizer: Arc<dyn PayloadFinalizer>,
    retry_delay: Duration,
    max_retry_count: AtomicU32,
    state: AtomicU8,
    /// Bumped on every `start()`; a drain task exits quietly when it
    /// is no longer the current generation.
    generation: AtomicU64,
    tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl DispatchWorker {
    /// Create an idle worker. Requests may be enqueued immediately;
    /// they wait until [`start`](Self::start).
    pub fn new(
        cache: Arc<RequestCache>,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthStatusProvider>,
        finalizer: Arc<dyn PayloadFinalizer>,
        config: DispatchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                cache,
                transport,
                auth,
                finalizer,
                retry_delay: config.retry_delay,
                max_retry_count: AtomicU32::new(config.max_retry_count),
                state: AtomicU8::new(WorkerState::Idle as u8),
                generation: AtomicU64::new(0),
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Whether a drain task is live.
    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Retry ceiling; `0` means unlimited.
    pub fn max_retry_count(&self) -> u32 {
        self.inner.max_retry_count.load(Ordering::SeqCst)
    }

    /// Change the retry ceiling at runtime.
    pub fn set_max_retry_count(&self, max: u32) {
        self.inner.max_retry_count.store(max, Ordering::SeqCst);
    }

    /// Start (or restart) the drain task. On entry it rehydrates
    /// pending requests from the cache, in stored order, ahead of any
    /// requests enqueued while idle. No-op when already running.
    pub fn start(&self) {
        let previous = self
            .inner
            .state
            .swap(WorkerState::Running as u8, Ordering::SeqCst);
        if previous == WorkerState::Running as u8 {
            return;
        }

        let rx = {
            let mut tx_guard = self.inner.tx.lock().expect("lock poisoned");
            let mut rx_guard = self.inner.rx.lock().expect("lock poisoned");
            match (tx_guard.is_some(), rx_guard.take()) {
                (true, Some(rx)) => rx,
                _ => {
                    // Restarting after stop: the old channel is gone.
                    let (tx, rx) = mpsc::unbounded_channel();
                    *tx_guard = Some(tx);
                    rx
                }
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Dispatch worker started");

        let worker = self.clone();
        tokio::spawn(async move { worker.run(rx, generation).await });
    }

    /// Stop accepting and processing work. Cooperative: an in-flight
    /// attempt finishes first. Anything persisted stays recoverable.
    pub fn stop(&self) {
        let previous = self
            .inner
            .state
            .swap(WorkerState::Stopped as u8, Ordering::SeqCst);
        if previous == WorkerState::Running as u8 {
            info!("Dispatch worker stopping");
        }
        // Dropping the sender wakes a blocked drain task.
        let tx = self.inner.tx.lock().expect("lock poisoned").take();
        drop(tx);
    }

    /// Wake the worker if it is blocked waiting for work, e.g. after
    /// an authentication status change re-admits deferred requests.
    pub fn signal(&self) {
        let guard = self.inner.tx.lock().expect("lock poisoned");
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Command::Signal);
        }
    }

    /// Enqueue a request described by its parts. Returns `false` (and
    /// does nothing) once the worker has been stopped.
    pub fn enqueue(
        &self,
        service_category: ServiceCategory,
        endpoint: impl Into<String>,
        method: HttpMethod,
        payload: Payload,
        completion: Option<Completion>,
        at_front: bool,
    ) -> bool {
        let mut request = Request::new(service_category, endpoint, method, payload);
        if let Some(completion) = completion {
            request = request.with_completion(completion);
        }
        self.enqueue_request(request, at_front)
    }

    /// Enqueue an already-built request.
    pub fn enqueue_request(&self, request: Request, at_front: bool) -> bool {
        if self.state() == WorkerState::Stopped {
            return false;
        }

        let guard = self.inner.tx.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx
                .send(Command::Enqueue {
                    item: CachedRequest::from_request(request),
                    at_front,
                })
                .is_ok(),
            None => false,
        }
    }

    /// The drain loop. Exactly one request is in flight at a time.
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>, generation: u64) {
        let mut queue: VecDeque<CachedRequest> = VecDeque::new();
        // Requests the service rejected with 401/403, keyed by the
        // status they were rejected under. Skipped until the status
        // changes; re-attempting under the same session would only
        // waste attempts.
        let mut parked: HashMap<String, AuthStatus> = HashMap::new();
        let mut last_status = self.inner.auth.status();

        match self.inner.cache.load_pending(last_status) {
            Ok(pending) => {
                if !pending.is_empty() {
                    info!(count = pending.len(), "Rehydrated pending requests");
                }
                queue.extend(pending);
            }
            Err(e) => warn!(error = %e, "Failed to load pending requests"),
        }

        loop {
            while let Ok(cmd) = rx.try_recv() {
                apply(cmd, &mut queue);
            }

            if self.inner.generation.load(Ordering::SeqCst) != generation {
                // A restart superseded this task.
                return;
            }
            if self.state() != WorkerState::Running {
                break;
            }

            let status = self.inner.auth.status();
            if status != last_status {
                last_status = status;
                parked.retain(|_, rejected_under| *rejected_under == status);
                self.reload_admitted(&mut queue, status);
            }
            self.persist_deferred(&mut queue, status);

            if let Some(idx) = next_deliverable(&queue, status, &parked) {
                if let Some(item) = queue.remove(idx) {
                    self.process(item, &mut queue, &mut parked).await;
                }
            } else {
                // Nothing deliverable: block until enqueued, signaled,
                // or stopped.
                match rx.recv().await {
                    Some(cmd) => apply(cmd, &mut queue),
                    None => break,
                }
            }
        }

        if self.inner.generation.load(Ordering::SeqCst) == generation {
            self.inner
                .state
                .store(WorkerState::Stopped as u8, Ordering::SeqCst);
            debug!(abandoned = queue.len(), "Dispatch worker exited");
        }
    }

    /// Pull rows that became deliverable after a status change back
    /// into the queue, e.g. Post rows rehydrated while the status was
    /// still undetermined. Rows already held in memory are skipped.
    fn reload_admitted(&self, queue: &mut VecDeque<CachedRequest>, status: AuthStatus) {
        let pending = match self.inner.cache.load_pending(status) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to reload pending requests");
                return;
            }
        };

        let known: HashSet<&str> = queue.iter().map(|i| i.request_id.as_str()).collect();
        let readmitted: Vec<CachedRequest> = pending
            .into_iter()
            .filter(|item| !known.contains(item.request_id.as_str()))
            .collect();
        drop(known);

        if !readmitted.is_empty() {
            debug!(count = readmitted.len(), "Re-admitted stored requests");
            queue.extend(readmitted);
        }
    }

    /// Persist requests that are waiting on authentication, so a crash
    /// while deferred cannot lose them.
    fn persist_deferred(&self, queue: &mut VecDeque<CachedRequest>, status: AuthStatus) {
        for item in queue.iter_mut() {
            if !status.admits(item.request.service_category) && !item.is_persisted() {
                if let Err(e) = item.persist(&self.inner.cache) {
                    warn!(
                        request_id = %item.request_id,
                        error = %e,
                        "Deferred request persist failed; retaining in memory"
                    );
                }
            }
        }
    }

    /// Attempt delivery of one request and resolve the outcome.
    async fn process(
        &self,
        item: CachedRequest,
        queue: &mut VecDeque<CachedRequest>,
        parked: &mut HashMap<String, AuthStatus>,
    ) {
        let payload = self.inner.finalizer.finalize(&item.request.payload);
        let result = self
            .inner
            .transport
            .execute(item.request.method, &item.request.endpoint, &payload)
            .await;

        match result {
            Ok(response) if response.is_success() => self.complete_delivered(item, response),
            Ok(response) if response.is_auth_required() => {
                debug!(
                    request_id = %item.request_id,
                    status = response.status,
                    "Delivery parked; service rejected the session"
                );
                parked.insert(item.request_id.clone(), self.inner.auth.status());
                self.requeue_deferred(item, queue);
            }
            Ok(response) => {
                warn!(
                    request_id = %item.request_id,
                    status = response.status,
                    "Delivery failed"
                );
                self.handle_failure(item, queue).await;
            }
            Err(e) => {
                warn!(request_id = %item.request_id, error = %e, "Delivery failed");
                self.handle_failure(item, queue).await;
            }
        }
    }

    /// Success: evict the row, fire the completion.
    fn complete_delivered(&self, mut item: CachedRequest, response: Response) {
        if let Err(e) = item.remove(&self.inner.cache) {
            warn!(
                request_id = %item.request_id,
                error = %e,
                "Cache removal failed after delivery"
            );
        }
        debug!(
            request_id = %item.request_id,
            status = response.status,
            "Request delivered"
        );
        if let Some(completion) = item.request.take_completion() {
            completion(
                DeliveryOutcome::Delivered {
                    status: response.status,
                    body: response.body,
                },
                self,
            );
        }
    }

    /// Authentication-required response: not a counted failure. The
    /// request is made durable and re-queued at the back; parked, it
    /// is not attempted again until the status changes.
    fn requeue_deferred(&self, mut item: CachedRequest, queue: &mut VecDeque<CachedRequest>) {
        if !item.is_persisted() {
            if let Err(e) = item.persist(&self.inner.cache) {
                warn!(
                    request_id = %item.request_id,
                    error = %e,
                    "Deferred request persist failed; retaining in memory"
                );
            }
        }
        queue.push_back(item);
    }

    /// Counted failure: abandon at the ceiling, otherwise promote to
    /// durable, bump the retry counter, and move to the back.
    async fn handle_failure(&self, mut item: CachedRequest, queue: &mut VecDeque<CachedRequest>) {
        let max = self.max_retry_count();
        let attempts = item.retry_count + 1;

        if max != 0 && attempts >= max {
            warn!(
                request_id = %item.request_id,
                attempts,
                max_retry_count = max,
                "Retry ceiling reached; abandoning request"
            );
            if let Err(e) = item.remove(&self.inner.cache) {
                warn!(
                    request_id = %item.request_id,
                    error = %e,
                    "Cache removal failed for abandoned request"
                );
            }
            if let Some(completion) = item.request.take_completion() {
                completion(DeliveryOutcome::Abandoned { attempts }, self);
            }
            return;
        }

        if item.is_persisted() {
            if let Err(e) = item.increment_retry(&self.inner.cache) {
                warn!(
                    request_id = %item.request_id,
                    error = %e,
                    "Retry increment failed; in-memory count still advanced"
                );
            }
        } else {
            item.retry_count = attempts;
            if let Err(e) = item.persist(&self.inner.cache) {
                warn!(
                    request_id = %item.request_id,
                    error = %e,
                    "Persist after failure failed; retaining in memory"
                );
            }
        }

        queue.push_back(item);
        tokio::time::sleep(self.inner.retry_delay).await;
    }
}

impl RequestSink for DispatchWorker {
    fn submit(&self, request: Request, at_front: bool) -> bool {
        self.enqueue_request(request, at_front)
    }
}

fn apply(cmd: Command, queue: &mut VecDeque<CachedRequest>) {
    match cmd {
        Command::Enqueue { item, at_front } => {
            if at_front {
                queue.push_front(item);
            } else {
                queue.push_back(item);
            }
        }
        Command::Signal => {}
    }
}

/// Index of the next request to attempt: the first deliverable
/// authentication-category request if any, otherwise the first
/// deliverable request in FIFO order. Parked requests are skipped.
fn next_deliverable(
    queue: &VecDeque<CachedRequest>,
    status: AuthStatus,
    parked: &HashMap<String, AuthStatus>,
) -> Option<usize> {
    let mut first = None;
    for (idx, item) in queue.iter().enumerate() {
        let category = item.request.service_category;
        if !status.admits(category) || parked.contains_key(&item.request_id) {
            continue;
        }
        if category.is_authentication() {
            return Some(idx);
        }
        if first.is_none() {
            first = Some(idx);
        }
    }
    first
}
