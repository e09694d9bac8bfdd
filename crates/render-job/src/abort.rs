//! Abort entry point shared between a render job and its callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle that requests cancellation of one render job.
///
/// The first request wins; later requests are no-ops. Both the subtitle
/// pass and the primary render observe the same handle.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    destination: Arc<PathBuf>,
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub(crate) fn new(destination: PathBuf) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            destination: Arc::new(destination),
            tx: Arc::new(tx),
        }
    }

    /// Request an abort. Returns `true` only for the call that initiated it.
    pub fn abort(&self) -> bool {
        let initiated = self.tx.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        });
        if initiated {
            tracing::info!(destination = %self.destination.display(), "Render abort requested");
        }
        initiated
    }

    /// Abort only if this job renders to `destination`.
    pub fn abort_matching(&self, destination: &Path) -> bool {
        if self.destination.as_path() != destination {
            return false;
        }
        self.abort()
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_idempotent() {
        let handle = AbortHandle::new(PathBuf::from("/tmp/out.mp4"));
        let other = handle.clone();
        assert!(!handle.is_aborted());
        assert!(handle.abort());
        assert!(!other.abort());
        assert!(other.is_aborted());
    }

    #[test]
    fn test_abort_matching_checks_destination() {
        let handle = AbortHandle::new(PathBuf::from("/tmp/out.mp4"));
        assert!(!handle.abort_matching(Path::new("/tmp/other.mp4")));
        assert!(!handle.is_aborted());
        assert!(handle.abort_matching(Path::new("/tmp/out.mp4")));
    }

    #[tokio::test]
    async fn test_subscriber_sees_abort() {
        let handle = AbortHandle::new(PathBuf::from("/tmp/out.mp4"));
        let mut rx = handle.subscribe();
        handle.abort();
        assert!(*rx.wait_for(|aborted| *aborted).await.unwrap());
    }
}
