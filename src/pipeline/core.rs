use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};

/// Who initiated a resource fetch. Native-originated traffic is already
/// instrumented below this layer and must pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Native,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Pending,
    Succeeded,
    Failed,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Mutable record flowing through the chain: created per fetch, mutated by
/// each stage, discarded after the terminal callback fires.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub url: String,
    pub origin: RequestOrigin,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub outcome: FetchOutcome,
    pub error_message: Option<String>,
    correlation_id: Option<String>,
}

impl ResourceRequest {
    pub fn with_origin(url: impl Into<String>, origin: RequestOrigin) -> Self {
        Self {
            url: url.into(),
            origin,
            headers: Vec::new(),
            body: Vec::new(),
            outcome: FetchOutcome::Pending,
            error_message: None,
            correlation_id: None,
        }
    }

    pub fn runtime(url: impl Into<String>) -> Self {
        Self::with_origin(url, RequestOrigin::Runtime)
    }

    pub fn native(url: impl Into<String>) -> Self {
        Self::with_origin(url, RequestOrigin::Native)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Empty until the instrumentation stage runs for a runtime-originated
    /// request.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) {
        self.correlation_id = Some(id.into());
    }

    pub fn succeed(&mut self, body: Vec<u8>) {
        self.body = body;
        self.outcome = FetchOutcome::Succeeded;
        self.error_message = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.outcome = FetchOutcome::Failed;
        self.error_message = Some(message.into());
    }
}

/// One stage of the processor chain. All four hooks default to pass-through,
/// so a stage only overrides the directions it cares about.
///
/// Sync hooks return `true` to stop traversal and treat the fetch as fully
/// handled. Async hooks receive a [`Continuation`] they must fire exactly
/// once; firing is a move, so double delivery does not compile.
pub trait FetchProcessor: Send {
    fn name(&self) -> &str {
        "fetch_processor"
    }

    fn handle_request_sync(&mut self, _request: &mut ResourceRequest) -> bool {
        false
    }

    fn handle_request_async(&mut self, _request: &mut ResourceRequest, next: Continuation) {
        next.proceed();
    }

    fn handle_response_sync(&mut self, _request: &mut ResourceRequest) -> bool {
        false
    }

    fn handle_response_async(&mut self, _request: &mut ResourceRequest, next: Continuation) {
        next.proceed();
    }
}

/// Transport boundary that performs the underlying fetch between the request
/// and response phases.
pub trait ResourceLoader: Send {
    fn load(&mut self, request: &mut ResourceRequest);
}

impl<F> ResourceLoader for F
where
    F: FnMut(&mut ResourceRequest) + Send,
{
    fn load(&mut self, request: &mut ResourceRequest) {
        self(request)
    }
}

type FetchComplete = Box<dyn FnOnce(ResourceRequest) + Send>;
type SharedStages = Arc<Mutex<Vec<Box<dyn FetchProcessor>>>>;

/// Ordered processor chain. Requests traverse stages in registration order,
/// responses traverse them in reverse.
#[derive(Default)]
pub struct ProcessorChain {
    stages: SharedStages,
    logger: Option<Logger>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn register_processor<P>(&self, processor: P)
    where
        P: FetchProcessor + 'static,
    {
        self.stages
            .lock()
            .expect("processor chain mutex poisoned")
            .push(Box::new(processor));
    }

    pub fn len(&self) -> usize {
        self.stages
            .lock()
            .expect("processor chain mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drive the sync hooks: forward through the request hooks, the loader,
    /// then backward through the response hooks. A stage that reports the
    /// request fully handled short-circuits straight into the response phase
    /// and the loader is skipped.
    pub fn fetch_sync(&self, request: &mut ResourceRequest, loader: &mut dyn ResourceLoader) {
        let mut stages = self.stages.lock().expect("processor chain mutex poisoned");

        let mut handled_at = None;
        for (idx, stage) in stages.iter_mut().enumerate() {
            if stage.handle_request_sync(request) {
                handled_at = Some(idx);
                break;
            }
        }

        if handled_at.is_none() {
            loader.load(request);
        }

        let last = handled_at.or_else(|| stages.len().checked_sub(1));
        if let Some(last) = last {
            for stage in stages[..=last].iter_mut().rev() {
                if stage.handle_response_sync(request) {
                    break;
                }
            }
        }
        drop(stages);

        self.log_fetch(request, "fetch_sync_completed");
    }

    /// Drive the async hooks in continuation-passing style. Each stage must
    /// fire its continuation exactly once; it may do so after returning, from
    /// any thread. `done` receives the request exactly once, after the last
    /// response hook. A stage that drops its continuation unfired aborts the
    /// traversal and `done` sees the request marked failed.
    pub fn fetch_async(
        &self,
        request: ResourceRequest,
        loader: impl ResourceLoader + 'static,
        done: impl FnOnce(ResourceRequest) + Send + 'static,
    ) {
        let drive = Arc::new(Drive {
            stages: Arc::clone(&self.stages),
            request: Mutex::new(Some(request)),
            loader: Mutex::new(Some(Box::new(loader))),
            done: Mutex::new(Some(Box::new(done))),
            state: Mutex::new(DriveState {
                phase: Phase::Request(0),
                hook: HookState::Idle,
                aborted: false,
            }),
            logger: self.logger.clone(),
        });
        drive_run(&drive);
    }

    fn log_fetch(&self, request: &ResourceRequest, message: &str) {
        if let Some(logger) = self.logger.as_ref() {
            let event = event_with_fields(
                LogLevel::Debug,
                "devsupport::pipeline",
                message,
                [
                    json_kv("url", json!(request.url.clone())),
                    json_kv("outcome", json!(request.outcome.as_str())),
                ],
            );
            let _ = logger.log_event(event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Request(usize),
    Response(usize),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookState {
    Idle,
    Running,
    Fired,
    Parked,
}

struct DriveState {
    phase: Phase,
    hook: HookState,
    aborted: bool,
}

/// State of one in-flight async traversal. The drive loop and any deferred
/// continuation hand control back and forth through `state.hook`: the loop
/// parks itself when a hook defers, and the continuation resumes it.
struct Drive {
    stages: SharedStages,
    request: Mutex<Option<ResourceRequest>>,
    loader: Mutex<Option<Box<dyn ResourceLoader>>>,
    done: Mutex<Option<FetchComplete>>,
    state: Mutex<DriveState>,
    logger: Option<Logger>,
}

fn drive_run(drive: &Arc<Drive>) {
    loop {
        let phase = drive.state.lock().expect("drive mutex poisoned").phase;
        match phase {
            Phase::Request(idx) => {
                let len = drive
                    .stages
                    .lock()
                    .expect("processor chain mutex poisoned")
                    .len();
                if idx < len {
                    if !drive_invoke(drive, idx, Direction::Request) {
                        return;
                    }
                    continue;
                }
                drive.load();
                let next = match len {
                    0 => Phase::Done,
                    n => Phase::Response(n - 1),
                };
                drive.state.lock().expect("drive mutex poisoned").phase = next;
            }
            Phase::Response(idx) => {
                if !drive_invoke(drive, idx, Direction::Response) {
                    return;
                }
            }
            Phase::Done => {
                drive.finish();
                return;
            }
        }
    }
}

/// Run one hook. Returns `false` when the hook deferred its continuation and
/// the loop must park.
fn drive_invoke(drive: &Arc<Drive>, idx: usize, direction: Direction) -> bool {
    drive.state.lock().expect("drive mutex poisoned").hook = HookState::Running;
    let next = Continuation {
        drive: Some(Arc::clone(drive)),
    };

    let leftover = {
        let mut stages = drive.stages.lock().expect("processor chain mutex poisoned");
        let mut slot = drive.request.lock().expect("drive mutex poisoned");
        match (stages.get_mut(idx), slot.as_mut()) {
            (Some(stage), Some(request)) => {
                match direction {
                    Direction::Request => stage.handle_request_async(request, next),
                    Direction::Response => stage.handle_response_async(request, next),
                }
                None
            }
            // Stage vanished mid-flight; nothing to run for this index.
            _ => Some(next),
        }
    };
    if let Some(next) = leftover {
        next.proceed();
    }

    let mut state = drive.state.lock().expect("drive mutex poisoned");
    if state.hook == HookState::Fired {
        state.hook = HookState::Idle;
        true
    } else {
        state.hook = HookState::Parked;
        false
    }
}

/// Advance the phase cursor after a continuation fires. Either the parked
/// loop resumes here, or the still-running loop is told to keep going.
fn drive_advance(drive: &Arc<Drive>, abort: bool) {
    let resume = {
        let mut state = drive.state.lock().expect("drive mutex poisoned");
        if abort {
            state.aborted = true;
            state.phase = Phase::Done;
        } else {
            state.phase = match state.phase {
                Phase::Request(idx) => Phase::Request(idx + 1),
                Phase::Response(0) => Phase::Done,
                Phase::Response(idx) => Phase::Response(idx - 1),
                Phase::Done => Phase::Done,
            };
        }
        match state.hook {
            HookState::Running => {
                state.hook = HookState::Fired;
                false
            }
            HookState::Parked => {
                state.hook = HookState::Idle;
                true
            }
            _ => false,
        }
    };
    if resume {
        drive_run(drive);
    }
}

impl Drive {
    fn load(&self) {
        if let Some(mut loader) = self.loader.lock().expect("drive mutex poisoned").take() {
            let mut slot = self.request.lock().expect("drive mutex poisoned");
            if let Some(request) = slot.as_mut() {
                loader.load(request);
            }
        }
    }

    fn finish(&self) {
        let aborted = self.state.lock().expect("drive mutex poisoned").aborted;
        let request = self.request.lock().expect("drive mutex poisoned").take();
        let done = self.done.lock().expect("drive mutex poisoned").take();
        if let (Some(mut request), Some(done)) = (request, done) {
            if aborted && request.outcome != FetchOutcome::Failed {
                request.fail("processor dropped its continuation");
            }
            if let Some(logger) = self.logger.as_ref() {
                let event = event_with_fields(
                    LogLevel::Debug,
                    "devsupport::pipeline",
                    "fetch_async_completed",
                    [
                        json_kv("url", json!(request.url.clone())),
                        json_kv("outcome", json!(request.outcome.as_str())),
                        json_kv("aborted", json!(aborted)),
                    ],
                );
                let _ = logger.log_event(event);
            }
            done(request);
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Request,
    Response,
}

/// Move-once handle an async hook fires to hand the request to the next
/// stage. Dropping it unfired aborts the traversal instead of stranding the
/// caller.
pub struct Continuation {
    drive: Option<Arc<Drive>>,
}

impl Continuation {
    pub fn proceed(mut self) {
        if let Some(drive) = self.drive.take() {
            drive_advance(&drive, false);
        }
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if let Some(drive) = self.drive.take() {
            drive_advance(&drive, true);
        }
    }
}
