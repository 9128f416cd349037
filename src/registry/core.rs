use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identity of one attachment point (a window, activity, or equivalent).
pub type HostId = String;

/// External view-system boundary for one host surface. The registry only
/// needs identity, the modal capability query, and affordance mounting.
pub trait HostSurface: Send + Sync {
    fn identity(&self) -> HostId;

    /// Whether this surface can present a modal dialog. Non-interactive
    /// contexts return false and get log-only behavior.
    fn supports_modal(&self) -> bool {
        true
    }

    /// Insert the clickable affordance into this host's root view layer.
    /// Returns false when the surface cannot host a view; the host stays
    /// trackable with no visible control.
    fn mount_affordance(&self, _affordance: &AffordanceHandle) -> bool {
        false
    }

    fn unmount_affordance(&self, _affordance: &AffordanceHandle) {}
}

/// One overlay affordance instance. Ids are process-unique so a re-attach
/// observably produces a fresh control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffordanceHandle {
    pub id: u64,
    pub host: HostId,
}

static NEXT_AFFORDANCE_ID: AtomicU64 = AtomicU64::new(1);

impl AffordanceHandle {
    fn next(host: HostId) -> Self {
        Self {
            id: NEXT_AFFORDANCE_ID.fetch_add(1, Ordering::Relaxed),
            host,
        }
    }
}

/// Registry entry tying a host identity to its surface and affordance.
#[derive(Clone)]
pub struct HostHandle {
    identity: HostId,
    surface: Arc<dyn HostSurface>,
    affordance: AffordanceHandle,
    mounted: bool,
}

impl HostHandle {
    pub fn identity(&self) -> &HostId {
        &self.identity
    }

    pub fn surface(&self) -> &Arc<dyn HostSurface> {
        &self.surface
    }

    pub fn affordance(&self) -> &AffordanceHandle {
        &self.affordance
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

#[derive(Default)]
struct Attachments {
    handles: HashMap<HostId, HostHandle>,
    stack: Vec<HostHandle>,
}

/// Identity→handle mapping plus the most-recently-attached stack, owned
/// together behind one mutex so the two structures can never disagree.
///
/// Only attach/detach/peek are exposed; there is no raw map access.
#[derive(Default)]
pub struct HostRegistry {
    inner: Mutex<Attachments>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a fresh affordance on the surface and push it as the active
    /// host. Attaching an identity that is already attached implicitly
    /// detaches the prior handle first, so a stale entry can never be
    /// resurfaced by [`peek_active`](Self::peek_active).
    pub fn attach(&self, surface: Arc<dyn HostSurface>) -> AffordanceHandle {
        let identity = surface.identity();
        let affordance = AffordanceHandle::next(identity.clone());
        let mounted = surface.mount_affordance(&affordance);
        let handle = HostHandle {
            identity: identity.clone(),
            surface,
            affordance: affordance.clone(),
            mounted,
        };

        let prior = {
            let mut inner = self.inner.lock().expect("host registry mutex poisoned");
            let prior = inner.handles.insert(identity.clone(), handle.clone());
            if prior.is_some() {
                inner.stack.retain(|entry| entry.identity != identity);
            }
            inner.stack.push(handle);
            prior
        };

        if let Some(prior) = prior {
            if prior.mounted {
                prior.surface.unmount_affordance(&prior.affordance);
            }
        }
        affordance
    }

    /// Remove the handle from both structures, wherever it sits in the
    /// stack, and unmount its affordance. No-op for unknown identities.
    pub fn detach(&self, identity: &HostId) -> Option<HostHandle> {
        let handle = {
            let mut inner = self.inner.lock().expect("host registry mutex poisoned");
            let handle = inner.handles.remove(identity)?;
            inner.stack.retain(|entry| entry.identity != *identity);
            handle
        };

        if handle.mounted {
            handle.surface.unmount_affordance(&handle.affordance);
        }
        Some(handle)
    }

    /// The most recently attached surviving handle; where modal UI renders.
    pub fn peek_active(&self) -> Option<HostHandle> {
        self.inner
            .lock()
            .expect("host registry mutex poisoned")
            .stack
            .last()
            .cloned()
    }

    pub fn find(&self, identity: &HostId) -> Option<HostHandle> {
        self.inner
            .lock()
            .expect("host registry mutex poisoned")
            .handles
            .get(identity)
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("host registry mutex poisoned");
        debug_assert_eq!(inner.handles.len(), inner.stack.len());
        inner.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeSurface {
        identity: HostId,
        modal: bool,
        view_layer: bool,
        mounts: AtomicUsize,
        unmounts: AtomicUsize,
    }

    impl FakeSurface {
        fn new(identity: &str) -> Arc<Self> {
            Arc::new(Self {
                identity: identity.to_string(),
                modal: true,
                view_layer: true,
                mounts: AtomicUsize::new(0),
                unmounts: AtomicUsize::new(0),
            })
        }

        fn headless(identity: &str) -> Arc<Self> {
            Arc::new(Self {
                identity: identity.to_string(),
                modal: false,
                view_layer: false,
                mounts: AtomicUsize::new(0),
                unmounts: AtomicUsize::new(0),
            })
        }
    }

    impl HostSurface for FakeSurface {
        fn identity(&self) -> HostId {
            self.identity.clone()
        }

        fn supports_modal(&self) -> bool {
            self.modal
        }

        fn mount_affordance(&self, _affordance: &AffordanceHandle) -> bool {
            self.mounts.fetch_add(1, Ordering::Relaxed);
            self.view_layer
        }

        fn unmount_affordance(&self, _affordance: &AffordanceHandle) {
            self.unmounts.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn peek_tracks_most_recent_attachment() {
        let registry = HostRegistry::new();
        registry.attach(FakeSurface::new("a"));
        registry.attach(FakeSurface::new("b"));

        assert_eq!(registry.peek_active().unwrap().identity(), "b");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn detach_non_top_leaves_peek_unchanged() {
        let registry = HostRegistry::new();
        registry.attach(FakeSurface::new("a"));
        registry.attach(FakeSurface::new("b"));
        registry.attach(FakeSurface::new("c"));

        registry.detach(&"b".to_string());

        assert_eq!(registry.peek_active().unwrap().identity(), "c");
        assert_eq!(registry.len(), 2);
        assert!(registry.find(&"b".to_string()).is_none());
    }

    #[test]
    fn detach_top_falls_back_to_previous() {
        let registry = HostRegistry::new();
        registry.attach(FakeSurface::new("a"));
        registry.attach(FakeSurface::new("b"));

        registry.detach(&"b".to_string());
        assert_eq!(registry.peek_active().unwrap().identity(), "a");
    }

    #[test]
    fn detach_unknown_identity_is_noop() {
        let registry = HostRegistry::new();
        registry.attach(FakeSurface::new("a"));
        assert!(registry.detach(&"ghost".to_string()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detach_unmounts_affordance() {
        let registry = HostRegistry::new();
        let surface = FakeSurface::new("a");
        registry.attach(surface.clone());
        registry.detach(&"a".to_string());

        assert_eq!(surface.mounts.load(Ordering::Relaxed), 1);
        assert_eq!(surface.unmounts.load(Ordering::Relaxed), 1);
        assert!(registry.peek_active().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn headless_host_stays_trackable_without_view() {
        let registry = HostRegistry::new();
        registry.attach(FakeSurface::headless("bg"));

        let handle = registry.peek_active().unwrap();
        assert!(!handle.is_mounted());
        assert!(!handle.surface().supports_modal());

        // No mounted view, so nothing to unmount either.
        let detached = registry.detach(&"bg".to_string()).unwrap();
        assert!(!detached.is_mounted());
    }

    #[test]
    fn reattach_replaces_prior_handle_and_stack_entry() {
        let registry = HostRegistry::new();
        let surface = FakeSurface::new("a");
        let first = registry.attach(surface.clone());
        registry.attach(FakeSurface::new("b"));
        let second = registry.attach(surface.clone());

        assert_ne!(first.id, second.id);
        assert_eq!(registry.len(), 2);
        // The prior affordance was unmounted when it was replaced.
        assert_eq!(surface.unmounts.load(Ordering::Relaxed), 1);
        assert_eq!(registry.peek_active().unwrap().affordance().id, second.id);

        // Detaching the fresh handle must not resurface a stale one.
        registry.detach(&"a".to_string());
        assert_eq!(registry.peek_active().unwrap().identity(), "b");
    }

    #[test]
    fn detach_then_attach_behaves_like_fresh_attach() {
        let registry = HostRegistry::new();
        let surface = FakeSurface::new("a");
        let first = registry.attach(surface.clone());
        registry.detach(&"a".to_string());
        let second = registry.attach(surface.clone());

        assert_ne!(first.id, second.id);
        assert_eq!(registry.peek_active().unwrap().identity(), "a");
        assert_eq!(registry.len(), 1);
    }
}
