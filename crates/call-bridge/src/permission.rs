//! Capability checks and asynchronous grant requests
//!
//! The OS permission dialogs live behind [`CapabilityProvider`]. A request is
//! recorded as a pending entry keyed by the caller's request code before the
//! provider is consulted; each answer the provider gives through its
//! [`CapabilityResponder`] resolves one kind of that entry and is delivered as a
//! `permissionResult` event.
//!
//! The gate does not restrict media commands. Callers check
//! [`CallBridge::has_capability`](crate::CallBridge::has_capability) first.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::bridge::BridgeInner;
use crate::error::{BridgeError, Result};
use crate::events::{CallEvent, PERMISSION_DENIED, PERMISSION_GRANTED};
use crate::types::{CapabilityKind, CapabilityState, PendingKind, PendingRequest};

/// Platform permission API
pub trait CapabilityProvider: Send + Sync {
    /// Whether the capability is currently granted; must not block
    fn is_granted(&self, kind: CapabilityKind) -> bool;

    /// Prompt for the capabilities
    ///
    /// Answer each kind through `responder`, from any thread, now or later.
    fn request(&self, kinds: &[CapabilityKind], responder: CapabilityResponder);
}

/// Route for a provider's answers to one request
#[derive(Clone)]
pub struct CapabilityResponder {
    inner: Weak<BridgeInner>,
    request_code: i32,
}

impl CapabilityResponder {
    pub fn request_code(&self) -> i32 {
        self.request_code
    }

    /// Report the answer for one capability
    ///
    /// Returns `false` if the answer did not match an outstanding request or
    /// the bridge is gone.
    pub fn respond(&self, kind: CapabilityKind, granted: bool) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            debug!("Bridge dropped, discarding {} permission answer", kind);
            return false;
        };
        if !inner.permissions.resolve(self.request_code, kind) {
            warn!(
                "Ignoring {} permission answer for unknown request code {}",
                kind, self.request_code
            );
            return false;
        }

        let code = if granted {
            PERMISSION_GRANTED
        } else {
            PERMISSION_DENIED
        };
        inner.ingest(CallEvent::PermissionResult { kind, code });
        true
    }
}

/// Outstanding capability requests keyed by request code
pub(crate) struct PermissionGate {
    provider: Arc<dyn CapabilityProvider>,
    pending: DashMap<i32, PendingRequest>,
    next_id: AtomicU64,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            provider,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn has_capability(&self, kind: CapabilityKind) -> bool {
        self.provider.is_granted(kind)
    }

    pub fn capability_state(&self, kind: CapabilityKind) -> CapabilityState {
        let outstanding = self.pending.iter().any(|entry| {
            matches!(&entry.value().kind, PendingKind::Permission { kinds, .. } if kinds.contains(&kind))
        });
        if outstanding {
            CapabilityState::Pending
        } else if self.provider.is_granted(kind) {
            CapabilityState::Granted
        } else {
            CapabilityState::Denied
        }
    }

    pub fn request(
        &self,
        inner: Weak<BridgeInner>,
        kinds: &[CapabilityKind],
        request_code: i32,
    ) -> Result<()> {
        if kinds.is_empty() {
            return Err(BridgeError::invalid_argument("no capabilities requested"));
        }

        // Register before asking: the provider may answer synchronously.
        let requested: BTreeSet<CapabilityKind> = kinds.iter().copied().collect();
        {
            let mut entry = self.pending.entry(request_code).or_insert_with(|| PendingRequest {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                kind: PendingKind::Permission {
                    request_code,
                    kinds: BTreeSet::new(),
                },
            });
            if let PendingKind::Permission { kinds, .. } = &mut entry.kind {
                kinds.extend(requested.iter().copied());
            }
        }

        let kinds: Vec<CapabilityKind> = requested.into_iter().collect();
        self.provider.request(
            &kinds,
            CapabilityResponder {
                inner,
                request_code,
            },
        );
        Ok(())
    }

    /// Consume one kind of a pending request
    fn resolve(&self, request_code: i32, kind: CapabilityKind) -> bool {
        let matched = match self.pending.get_mut(&request_code) {
            Some(mut entry) => match &mut entry.kind {
                PendingKind::Permission { kinds, .. } => kinds.remove(&kind),
                _ => false,
            },
            None => false,
        };
        let finished = self.pending.remove_if(&request_code, |_, request| {
            matches!(&request.kind, PendingKind::Permission { kinds, .. } if kinds.is_empty())
        });
        if finished.is_some() {
            debug!("Permission request {} complete", request_code);
        }
        matched
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

/// Provider answering from a fixed table, immediately
///
/// Every capability starts granted, like a desktop host without permission
/// prompts.
pub struct StaticCapabilityProvider {
    grants: DashMap<CapabilityKind, bool>,
}

impl StaticCapabilityProvider {
    pub fn new() -> Self {
        let grants = DashMap::new();
        grants.insert(CapabilityKind::Camera, true);
        grants.insert(CapabilityKind::Microphone, true);
        Self { grants }
    }

    pub fn set_granted(&self, kind: CapabilityKind, granted: bool) {
        self.grants.insert(kind, granted);
    }
}

impl Default for StaticCapabilityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProvider for StaticCapabilityProvider {
    fn is_granted(&self, kind: CapabilityKind) -> bool {
        self.grants.get(&kind).map(|granted| *granted).unwrap_or(false)
    }

    fn request(&self, kinds: &[CapabilityKind], responder: CapabilityResponder) {
        for kind in kinds {
            responder.respond(*kind, self.is_granted(*kind));
        }
    }
}
