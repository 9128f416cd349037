use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::error::DevError;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::DevMetrics;
use crate::registry::{AffordanceHandle, HostHandle, HostId, HostRegistry, HostSurface};

use super::config::DevServerConfig;

pub type UiTask = Box<dyn FnOnce() + Send>;

/// Marshals dialog work onto the UI-owning context. Everything that touches
/// dialog visibility goes through here; the rest of the session runs on the
/// calling thread.
pub trait UiDispatcher: Send + Sync {
    fn run_on_ui(&self, task: UiTask);
}

/// Runs tasks inline on the calling thread. For tests and headless embeds.
#[derive(Default)]
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn run_on_ui(&self, task: UiTask) {
        task()
    }
}

/// Capability the embedder hands in so the session can trigger reloads, or
/// report that startup failed before any host could show UI.
pub trait ReloadCallback: Send + Sync {
    fn on_init_error(&self, error: &DevError);
    fn on_bundle_reload(&self);
}

/// External controller owning the persistent live-reload connection.
pub trait LiveReload: Send + Sync {
    fn start(&self, callback: Arc<dyn LiveReloadCallback>);
    fn stop(&self);
}

pub trait LiveReloadCallback: Send + Sync {
    fn on_ready(&self);
    fn on_compiled(&self);
}

pub type ReloadAction = Arc<dyn Fn() + Send + Sync>;
pub type MenuSelection = Arc<dyn Fn(usize) + Send + Sync>;

/// External view-system boundary that renders the actual dialogs. The
/// session owns all visibility decisions; the presenter only draws.
pub trait DialogPresenter: Send + Sync {
    fn show_progress(&self, host: &HostHandle);
    fn dismiss_progress(&self);
    fn show_exception(&self, host: &HostHandle, error: &DevError, on_reload: ReloadAction);
    fn dismiss_exception(&self);
    fn show_reload_menu(&self, host: &HostHandle, items: &[&str], on_select: MenuSelection);
}

/// Which modal the session currently has up. Exception wins over Progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Idle,
    Progress,
    Exception,
}

struct Dialogs {
    state: DialogState,
    /// Progress dialog requested before any host existed; shown on first
    /// attach.
    pending_progress: bool,
    /// Host the visible exception dialog is bound to, for defensive
    /// dismissal when that host detaches.
    exception_host: Option<HostId>,
}

struct OverlayInner {
    registry: Arc<HostRegistry>,
    presenter: Arc<dyn DialogPresenter>,
    ui: Arc<dyn UiDispatcher>,
    live_reload: Arc<dyn LiveReload>,
    config: Mutex<DevServerConfig>,
    reload_callback: Mutex<Option<Arc<dyn ReloadCallback>>>,
    dialogs: Mutex<Dialogs>,
    logger: Option<Logger>,
    metrics: Option<Arc<Mutex<DevMetrics>>>,
}

/// The debug session: one per runtime instance, shared across all attached
/// hosts. Cheap to clone; clones share state.
///
/// Network failures, uncaught exceptions, remote-debug failures,
/// compile-success and live-reload signals all converge on [`reload`]
/// (DevOverlay::reload); where UI is possible it renders against the most
/// recently attached host, and before any host exists failures escalate to
/// [`ReloadCallback::on_init_error`].
#[derive(Clone)]
pub struct DevOverlay {
    inner: Arc<OverlayInner>,
}

impl DevOverlay {
    pub fn new(
        mut config: DevServerConfig,
        registry: Arc<HostRegistry>,
        presenter: Arc<dyn DialogPresenter>,
        ui: Arc<dyn UiDispatcher>,
        live_reload: Arc<dyn LiveReload>,
    ) -> Self {
        let logger = config.logger.take();
        let metrics = config.metrics_handle();
        let overlay = Self {
            inner: Arc::new(OverlayInner {
                registry,
                presenter,
                ui,
                live_reload,
                config: Mutex::new(config),
                reload_callback: Mutex::new(None),
                dialogs: Mutex::new(Dialogs {
                    state: DialogState::Idle,
                    pending_progress: true,
                    exception_host: None,
                }),
                logger,
                metrics,
            }),
        };
        overlay.show_progress_dialog();
        overlay
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.inner.registry
    }

    pub fn dialog_state(&self) -> DialogState {
        self.lock_dialogs().state
    }

    pub fn set_reload_callback(&self, callback: Arc<dyn ReloadCallback>) {
        *self
            .inner
            .reload_callback
            .lock()
            .expect("overlay mutex poisoned") = Some(callback);
    }

    /// Attach a host surface: mounts the affordance, makes the host the
    /// active one, and shows the progress dialog if it was still pending.
    pub fn attach_to_host(&self, surface: Arc<dyn HostSurface>) -> AffordanceHandle {
        let affordance = self.inner.registry.attach(surface);
        self.log(
            LogLevel::Info,
            "host_attached",
            [json_kv("host", json!(affordance.host.clone()))],
        );
        if self.lock_dialogs().pending_progress {
            self.show_progress_dialog();
        }
        affordance
    }

    /// Detach a host. If the visible exception dialog was bound to it, the
    /// dialog is dismissed defensively.
    pub fn detach_from_host(&self, identity: &HostId) {
        if self.inner.registry.detach(identity).is_none() {
            return;
        }
        self.log(
            LogLevel::Info,
            "host_detached",
            [json_kv("host", json!(identity.clone()))],
        );

        let dismiss = {
            let mut dialogs = self.lock_dialogs();
            if dialogs.exception_host.as_ref() == Some(identity) {
                dialogs.exception_host = None;
                dialogs.state = DialogState::Idle;
                true
            } else {
                false
            }
        };
        if dismiss {
            let this = self.clone();
            self.inner
                .ui
                .run_on_ui(Box::new(move || this.inner.presenter.dismiss_exception()));
        }
    }

    /// Show (or re-show) the progress dialog on the active host. Without a
    /// host, creation stays deferred until the first attach.
    pub fn show_progress_dialog(&self) {
        let Some(host) = self.inner.registry.peek_active() else {
            self.lock_dialogs().pending_progress = true;
            return;
        };

        let this = self.clone();
        self.inner.ui.run_on_ui(Box::new(move || {
            let mut dialogs = this.lock_dialogs();
            if dialogs.state == DialogState::Exception {
                return;
            }
            dialogs.pending_progress = false;
            dialogs.state = DialogState::Progress;
            drop(dialogs);
            this.inner.presenter.show_progress(&host);
        }));
    }

    /// The resource load finished; take the progress dialog down.
    pub fn on_load_resource_succeeded(&self) {
        let this = self.clone();
        self.inner.ui.run_on_ui(Box::new(move || {
            let mut dialogs = this.lock_dialogs();
            dialogs.pending_progress = false;
            if dialogs.state == DialogState::Progress {
                dialogs.state = DialogState::Idle;
                drop(dialogs);
                this.inner.presenter.dismiss_progress();
            }
        }));
    }

    /// The resource load failed. With no host attached this is terminal for
    /// the session: the embedder is told startup failed. Otherwise it joins
    /// the exception path.
    pub fn on_load_resource_failed(&self, url: &str, message: Option<&str>) {
        let error = DevError::connection(url, message);
        if self.inner.registry.is_empty() {
            self.escalate_init_error(error);
        } else {
            self.handle_exception(error);
        }
    }

    /// Error surfaced by the remote-debug transport; same escalation rule as
    /// a failed load.
    pub fn on_remote_debug_exception(&self, error: DevError) {
        if self.inner.registry.is_empty() {
            self.escalate_init_error(error);
        } else {
            self.handle_exception(error);
        }
    }

    /// Route an error into the exception dialog. No active host or an
    /// already-visible dialog means no-op; the dialog itself is created on
    /// the UI context, re-checking the stack there since a host can detach
    /// in between.
    pub fn handle_exception(&self, error: DevError) {
        let this = self.clone();
        self.inner.ui.run_on_ui(Box::new(move || {
            let mut dialogs = this.lock_dialogs();
            dialogs.pending_progress = false;
            if dialogs.state == DialogState::Progress {
                dialogs.state = DialogState::Idle;
                drop(dialogs);
                this.inner.presenter.dismiss_progress();
            }
        }));

        if self.inner.registry.is_empty() {
            return;
        }
        if self.lock_dialogs().state == DialogState::Exception {
            return;
        }

        let this = self.clone();
        self.inner.ui.run_on_ui(Box::new(move || {
            let Some(host) = this.inner.registry.peek_active() else {
                return;
            };
            {
                let mut dialogs = this.lock_dialogs();
                if dialogs.state == DialogState::Exception {
                    return;
                }
                dialogs.state = DialogState::Exception;
                dialogs.exception_host = Some(host.identity().clone());
            }
            this.record(|m| {
                m.record_exception();
                m.record_dialog_shown();
            });
            this.log(
                LogLevel::Warn,
                "exception_dialog_shown",
                [
                    json_kv("host", json!(host.identity().clone())),
                    json_kv("kind", json!(error.kind())),
                ],
            );
            let that = this.clone();
            let on_reload: ReloadAction = Arc::new(move || that.on_dialog_reload());
            this.inner.presenter.show_exception(&host, &error, on_reload);
        }));
    }

    /// Click on the overlay affordance: hosts that cannot present a modal
    /// get a log line and nothing else; everyone else gets the one-item
    /// reload menu.
    pub fn on_affordance_click(&self, identity: &HostId) {
        let Some(handle) = self.inner.registry.find(identity) else {
            return;
        };
        if !handle.surface().supports_modal() {
            self.log(
                LogLevel::Error,
                "host cannot present a dialog, ignoring affordance click",
                [json_kv("host", json!(identity.clone()))],
            );
            return;
        }

        let this = self.clone();
        self.inner.ui.run_on_ui(Box::new(move || {
            let that = this.clone();
            let on_select: MenuSelection = Arc::new(move |which| {
                if which == 0 {
                    that.reload();
                }
            });
            this.inner
                .presenter
                .show_reload_menu(&handle, &["Reload"], on_select);
        }));
    }

    /// Single fan-in point for every reload trigger. Each call is delivered
    /// to the embedder independently; no dedup of rapid repeats.
    pub fn reload(&self) {
        self.record(|m| m.record_reload());
        self.log(LogLevel::Info, "bundle_reload_requested", std::iter::empty());
        let callback = self
            .inner
            .reload_callback
            .lock()
            .expect("overlay mutex poisoned")
            .clone();
        if let Some(callback) = callback {
            callback.on_bundle_reload();
        }
    }

    /// Re-evaluate the live-reload wiring against the current config.
    pub fn sync_live_debug(&self) {
        let enabled = self
            .inner
            .config
            .lock()
            .expect("overlay mutex poisoned")
            .live_debug;
        if enabled {
            self.inner
                .live_reload
                .start(Arc::new(self.clone()) as Arc<dyn LiveReloadCallback>);
        } else {
            self.inner.live_reload.stop();
        }
    }

    pub fn set_live_debug(&self, enabled: bool) {
        self.inner
            .config
            .lock()
            .expect("overlay mutex poisoned")
            .live_debug = enabled;
        self.sync_live_debug();
    }

    fn on_dialog_reload(&self) {
        {
            let mut dialogs = self.lock_dialogs();
            if dialogs.state == DialogState::Exception {
                dialogs.state = DialogState::Idle;
                dialogs.exception_host = None;
            }
        }
        self.inner.presenter.dismiss_exception();
        self.reload();
    }

    fn escalate_init_error(&self, error: DevError) {
        self.record(|m| m.record_init_error());
        self.log(
            LogLevel::Error,
            "init_error_escalated",
            [json_kv("kind", json!(error.kind()))],
        );
        let callback = self
            .inner
            .reload_callback
            .lock()
            .expect("overlay mutex poisoned")
            .clone();
        match callback {
            Some(callback) => callback.on_init_error(&error),
            None => self.log(
                LogLevel::Warn,
                "init error with no reload callback registered",
                std::iter::empty(),
            ),
        }
    }

    fn lock_dialogs(&self) -> std::sync::MutexGuard<'_, Dialogs> {
        self.inner.dialogs.lock().expect("overlay mutex poisoned")
    }

    fn record(&self, update: impl FnOnce(&mut DevMetrics)) {
        if let Some(metrics) = self.inner.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut guard);
            }
        }
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        fields: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        if let Some(logger) = self.inner.logger.as_ref() {
            let event = event_with_fields(level, "devsupport::overlay", message, fields);
            let _ = logger.log_event(event);
        }
    }
}

impl LiveReloadCallback for DevOverlay {
    fn on_ready(&self) {
        self.reload();
    }

    fn on_compiled(&self) {
        self.reload();
    }
}
