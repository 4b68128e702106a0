//! Single-flight background loads.

use futures_channel::oneshot;

/// Holds the current resource and at most one pending load for it.
///
/// Loads are serialized: while one is in flight further requests are refused, so two
/// results can never race to install themselves.
pub struct AsyncSlot<T> {
    current: Option<T>,
    pending: Option<oneshot::Receiver<anyhow::Result<T>>>,
}

impl<T> Default for AsyncSlot<T> {
    fn default() -> Self {
        Self { current: None, pending: None }
    }
}

impl<T> AsyncSlot<T> {
    /// The sender a loader task resolves, or `None` while a load is already running.
    pub fn request(&mut self) -> Option<oneshot::Sender<anyhow::Result<T>>> {
        if self.pending.is_some() {
            log::debug!("load already in flight, ignoring request");
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.pending = Some(rx);
        Some(tx)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Installs a finished load, dropping the resource it replaces. Returns true when
    /// the current value changed.
    pub fn poll(&mut self) -> bool {
        let Some(rx) = self.pending.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(None) => false,
            Ok(Some(Ok(value))) => {
                self.pending = None;
                self.current = Some(value);
                true
            }
            Ok(Some(Err(e))) => {
                self.pending = None;
                log::error!("Load failed: {e:#}");
                false
            }
            Err(oneshot::Canceled) => {
                self.pending = None;
                log::warn!("Load abandoned before completing");
                false
            }
        }
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn take(&mut self) -> Option<T> {
        self.current.take()
    }
}
