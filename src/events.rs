//! Typed publish/subscribe channels and the notification sink.
//!
//! Everything runs on the browser's single thread, so delivery is synchronous and
//! listeners live behind `Rc`. A [`Subscription`] removes its listener when dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::quality::QualityLevel;

type Listener<T> = Rc<dyn Fn(&T)>;

struct Listeners<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Listener<T>)>>,
}

/// One event category. Cloning yields another handle to the same listener list.
pub struct Channel<T> {
    inner: Rc<Listeners<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Listeners { next_id: Cell::new(0), entries: RefCell::new(Vec::new()) }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription
    where
        T: 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.entries.borrow_mut().push((id, Rc::new(listener)));

        let weak: Weak<Listeners<T>> = Rc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.entries.borrow_mut().retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Delivers `event` to every listener registered when the call started.
    pub fn emit(&self, event: &T) {
        // Snapshot so listeners may (un)subscribe while being called.
        let snapshot: Vec<Listener<T>> =
            self.inner.entries.borrow().iter().map(|(_, l)| Rc::clone(l)).collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }
}

/// Handle returned by [`Channel::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keeps the listener registered for as long as the channel exists.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.remove.is_some()).finish()
    }
}

// ------------------------------------------------------------------
// Event payloads
// ------------------------------------------------------------------

/// Emitted by the bed when an explicit fit check should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitChanged {
    pub fits: bool,
    pub changed: bool,
}

impl FitChanged {
    /// The toast a host shows for this event, if any.
    pub fn toast(&self) -> Option<Toast> {
        if !self.fits {
            Some(Toast::new("Model does not fit on the bed", 4000, Severity::Error))
        } else if self.changed {
            Some(Toast::new("Model fits on the bed", 2000, Severity::Success))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityChanged {
    pub level: QualityLevel,
}

// ------------------------------------------------------------------
// Notification sink
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub duration_ms: u32,
    pub severity: Severity,
}

impl Toast {
    pub fn new(text: impl Into<String>, duration_ms: u32, severity: Severity) -> Self {
        Self { text: text.into(), duration_ms, severity }
    }
}

/// Fire-and-forget user messages.
pub trait Notifier {
    fn show(&self, toast: Toast);
}

impl<N: Notifier + ?Sized> Notifier for Rc<N> {
    fn show(&self, toast: Toast) {
        (**self).show(toast)
    }
}

/// Queues toasts until the host drains them into its overlay.
#[derive(Default)]
pub struct ToastQueue {
    pending: RefCell<Vec<Toast>>,
}

impl ToastQueue {
    pub fn drain(&self) -> Vec<Toast> {
        self.pending.borrow_mut().drain(..).collect()
    }
}

impl Notifier for ToastQueue {
    fn show(&self, toast: Toast) {
        log::debug!("toast: {}", toast.text);
        self.pending.borrow_mut().push(toast);
    }
}
