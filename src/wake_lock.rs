//! Best-effort screen wake lock.
//!
//! The platform capability is reached through [`WakeLockProvider`]. A
//! granted lock is represented by a [`WakeLockHandle`] on the controller side
//! and a matching [`WakeLockLease`] on the platform side; the two halves tell
//! each other about explicit releases and platform revocations.
//!
//! Failing to get the lock never fails the session: [`WakeLockGuard`] logs
//! the reason and records [`WakeLockStatus::Unavailable`].

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ControllerError, Result};

/// A platform capability that can keep the display awake.
#[async_trait]
pub trait WakeLockProvider: Send {
    /// Ask the platform for a screen wake lock.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WakeLockUnavailable`] when the capability is
    /// absent or the request was denied.
    async fn request(&mut self) -> Result<WakeLockHandle>;
}

/// Provider for platforms without a wake-lock capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeLock;

#[async_trait]
impl WakeLockProvider for NoWakeLock {
    async fn request(&mut self) -> Result<WakeLockHandle> {
        Err(ControllerError::WakeLockUnavailable(
            "platform has no wake lock".into(),
        ))
    }
}

/// Controller half of a granted wake lock.
#[derive(Debug)]
pub struct WakeLockHandle {
    release_tx: Option<oneshot::Sender<()>>,
    revoked_rx: Option<oneshot::Receiver<()>>,
}

/// Platform half of a granted wake lock.
///
/// Dropping the lease counts as a revocation.
#[derive(Debug)]
pub struct WakeLockLease {
    release_rx: oneshot::Receiver<()>,
    revoked_tx: Option<oneshot::Sender<()>>,
}

impl WakeLockHandle {
    /// Create a linked handle/lease pair for a freshly granted lock.
    pub fn pair() -> (WakeLockHandle, WakeLockLease) {
        let (release_tx, release_rx) = oneshot::channel();
        let (revoked_tx, revoked_rx) = oneshot::channel();
        (
            WakeLockHandle {
                release_tx: Some(release_tx),
                revoked_rx: Some(revoked_rx),
            },
            WakeLockLease {
                release_rx,
                revoked_tx: Some(revoked_tx),
            },
        )
    }

    /// Tell the platform the lock is no longer needed.
    fn release(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl WakeLockLease {
    /// The platform dropped the lock on its own (backgrounding, OS policy).
    pub fn revoke(mut self) {
        if let Some(tx) = self.revoked_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Returns `true` once the controller has explicitly released the lock.
    pub fn is_released(&mut self) -> bool {
        matches!(self.release_rx.try_recv(), Ok(()))
    }

    /// Wait for the controller to release the lock. Returns `false` if the
    /// controller dropped its handle without releasing.
    pub async fn released(&mut self) -> bool {
        (&mut self.release_rx).await.is_ok()
    }
}

/// Where the wake lock stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeLockStatus {
    /// `acquire` has not run yet.
    #[default]
    NotRequested,
    /// The lock is held.
    Acquired,
    /// The platform could not provide the lock.
    Unavailable,
    /// The platform took the lock away.
    ReleasedExternally,
    /// The controller gave the lock back.
    Released,
}

impl WakeLockStatus {
    pub fn is_held(self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Owns the wake lock for one session.
#[derive(Debug, Default)]
pub struct WakeLockGuard {
    status: WakeLockStatus,
    handle: Option<WakeLockHandle>,
    watcher: Option<JoinHandle<()>>,
}

impl WakeLockGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the wake lock. Failures are logged and swallowed.
    ///
    /// If the lock is granted, `on_revoked` runs once when the platform later
    /// takes it away; the caller should then report it through
    /// [`mark_released_externally`](Self::mark_released_externally). The
    /// guard never re-acquires on its own.
    pub async fn acquire<P, F>(&mut self, provider: &mut P, on_revoked: F) -> WakeLockStatus
    where
        P: WakeLockProvider + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        if self.status.is_held() {
            return self.status;
        }
        match provider.request().await {
            Ok(mut handle) => {
                info!("wake lock active");
                if let Some(revoked) = handle.revoked_rx.take() {
                    // A dropped lease reads as a revocation too.
                    self.watcher = Some(tokio::spawn(async move {
                        let _ = revoked.await;
                        on_revoked();
                    }));
                }
                self.handle = Some(handle);
                self.status = WakeLockStatus::Acquired;
            }
            Err(e) => {
                warn!("wake lock unavailable: {e}");
                self.status = WakeLockStatus::Unavailable;
            }
        }
        self.status
    }

    /// Record that the platform took the lock away. Returns `true` if the
    /// lock was held until now.
    pub fn mark_released_externally(&mut self) -> bool {
        if !self.status.is_held() {
            return false;
        }
        info!("wake lock released by platform");
        self.watcher = None;
        self.handle = None;
        self.status = WakeLockStatus::ReleasedExternally;
        true
    }

    /// Give the lock back. Returns `true` if it was held.
    pub fn release(&mut self) -> bool {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        let Some(mut handle) = self.handle.take() else {
            debug!(status = ?self.status, "no wake lock to release");
            return false;
        };
        handle.release();
        self.status = WakeLockStatus::Released;
        info!("wake lock released");
        true
    }

    pub fn status(&self) -> WakeLockStatus {
        self.status
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Grants a lock and hands the lease back to the test.
    struct GrantingProvider {
        lease_tx: Option<oneshot::Sender<WakeLockLease>>,
    }

    #[async_trait]
    impl WakeLockProvider for GrantingProvider {
        async fn request(&mut self) -> Result<WakeLockHandle> {
            let (handle, lease) = WakeLockHandle::pair();
            if let Some(tx) = self.lease_tx.take() {
                let _ = tx.send(lease);
            }
            Ok(handle)
        }
    }

    fn granting() -> (GrantingProvider, oneshot::Receiver<WakeLockLease>) {
        let (tx, rx) = oneshot::channel();
        (GrantingProvider { lease_tx: Some(tx) }, rx)
    }

    #[tokio::test]
    async fn unavailable_provider_degrades_silently() {
        let mut guard = WakeLockGuard::new();
        assert_eq!(guard.status(), WakeLockStatus::NotRequested);

        let status = guard.acquire(&mut NoWakeLock, || {}).await;
        assert_eq!(status, WakeLockStatus::Unavailable);
        assert!(!guard.release());
        assert_eq!(guard.status(), WakeLockStatus::Unavailable);
    }

    #[tokio::test]
    async fn explicit_release_reaches_the_platform() {
        let (mut provider, lease_rx) = granting();
        let mut guard = WakeLockGuard::new();

        let status = guard.acquire(&mut provider, || {}).await;
        assert_eq!(status, WakeLockStatus::Acquired);
        let mut lease = lease_rx.await.unwrap();
        assert!(!lease.is_released());

        assert!(guard.release());
        assert_eq!(guard.status(), WakeLockStatus::Released);
        assert!(lease.released().await);
        assert!(!guard.release(), "second release is a no-op");
    }

    #[tokio::test]
    async fn platform_revocation_is_observed() {
        let (mut provider, lease_rx) = granting();
        let mut guard = WakeLockGuard::new();
        let (revoked_tx, revoked_rx) = oneshot::channel();

        guard
            .acquire(&mut provider, move || {
                let _ = revoked_tx.send(());
            })
            .await;
        lease_rx.await.unwrap().revoke();

        revoked_rx.await.unwrap();
        assert!(guard.mark_released_externally());
        assert_eq!(guard.status(), WakeLockStatus::ReleasedExternally);
        assert!(!guard.mark_released_externally());
        assert!(!guard.release());
    }

    #[tokio::test]
    async fn lease_waits_until_released() {
        let (mut provider, lease_rx) = granting();
        let mut guard = WakeLockGuard::new();
        guard.acquire(&mut provider, || {}).await;
        let mut lease = lease_rx.await.unwrap();

        let mut released = tokio_test::task::spawn(lease.released());
        tokio_test::assert_pending!(released.poll());

        guard.release();
        assert!(released.is_woken());
        tokio_test::assert_ready_eq!(released.poll(), true);
    }

    #[tokio::test]
    async fn release_does_not_report_a_revocation() {
        let (mut provider, lease_rx) = granting();
        let mut guard = WakeLockGuard::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        guard
            .acquire(&mut provider, move || flag.store(true, Ordering::SeqCst))
            .await;
        let lease = lease_rx.await.unwrap();

        guard.release();
        drop(lease);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(!fired.load(Ordering::SeqCst));
    }
}
