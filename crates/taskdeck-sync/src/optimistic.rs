use std::future::Future;

use taskdeck_core::TaskError;

/// Snapshot-before / apply-locally / persist-async / restore-on-failure.
///
/// The local state shows the applied value for the whole life of the
/// persist call; a failed persist puts the snapshot back before the
/// error is returned, so no intermediate state is ever observable.
/// Reusable for any locally mirrored, remotely persisted value.
pub struct OptimisticTxn<T: Clone> {
    snapshot: T,
}

impl<T: Clone> OptimisticTxn<T> {
    /// Capture the pre-change snapshot.
    pub fn begin(current: &T) -> Self {
        Self {
            snapshot: current.clone(),
        }
    }

    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }

    /// Apply the local change, then persist. On persist failure the
    /// snapshot is handed to `restore` before the error propagates.
    pub async fn run<A, P, R>(self, apply: A, persist: P, restore: R) -> Result<(), TaskError>
    where
        A: FnOnce(),
        P: Future<Output = Result<(), TaskError>>,
        R: FnOnce(T),
    {
        apply();
        match persist.await {
            Ok(()) => Ok(()),
            Err(e) => {
                restore(self.snapshot);
                Err(e)
            }
        }
    }
}
