//! Pull-style notification between simulation entities and their listeners.
//!
//! An [Observable] subject keeps weak references to its [Observer]s and calls
//! [Observer::see] with a reference to itself whenever its state changes.
//! No payload is pushed; the observer reads whatever it needs from the subject.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Receives notifications from subjects of type `S`.
pub trait Observer<S: ?Sized> {
    /// Called after the subject's state has changed.
    fn see(&mut self, subject: &S);
}

/// A shared, mutable observer handle.
pub type ObserverRef<S> = Rc<RefCell<dyn Observer<S>>>;

/// The set of observers subscribed to one subject.
///
/// Subscribers are held weakly, so dropping an observer elsewhere is enough to
/// unsubscribe it. The set sits behind a [RefCell] so observers can be attached
/// or detached through a shared reference, including from within [Observer::see].
pub struct Observers<S: ?Sized> {
    subscribers: RefCell<Vec<Weak<RefCell<dyn Observer<S>>>>>,
}

impl<S: ?Sized> Default for Observers<S> {
    fn default() -> Self {
        Self {
            subscribers: RefCell::new(vec![]),
        }
    }
}

impl<S: ?Sized> Observers<S> {
    /// Creates an empty observer set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes an observer. Adding the same observer twice has no effect.
    pub fn add(&self, observer: &ObserverRef<S>) {
        if self.position(observer).is_none() {
            self.subscribers.borrow_mut().push(Rc::downgrade(observer));
        }
    }

    /// Unsubscribes an observer, returning whether it was subscribed.
    pub fn detach(&self, observer: &ObserverRef<S>) -> bool {
        match self.position(observer) {
            Some(idx) => {
                self.subscribers.borrow_mut().swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Unsubscribes every observer.
    pub fn detach_all(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// The number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether there are no live subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies every live subscriber and returns how many were notified.
    ///
    /// Iterates over a snapshot of the set, so observers may be attached or
    /// detached during notification. An observer that is already borrowed
    /// (re-entrant notification) is skipped.
    pub fn notify(&self, subject: &S) -> usize {
        let snapshot = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        };

        let mut notified = 0;
        for observer in snapshot {
            if let Ok(mut observer) = observer.try_borrow_mut() {
                observer.see(subject);
                notified += 1;
            }
        }
        notified
    }

    fn position(&self, observer: &ObserverRef<S>) -> Option<usize> {
        let target = Rc::as_ptr(observer) as *const ();
        self.subscribers
            .borrow()
            .iter()
            .position(|weak| weak.as_ptr() as *const () == target)
    }
}

/// A subject which observers may subscribe to.
pub trait Observable {
    /// The subject's observer set.
    fn observers(&self) -> &Observers<Self>;

    /// Subscribes an observer to this subject.
    fn add_observer(&self, observer: &ObserverRef<Self>) {
        self.observers().add(observer);
    }

    /// Unsubscribes an observer from this subject.
    fn detach_observer(&self, observer: &ObserverRef<Self>) -> bool {
        self.observers().detach(observer)
    }

    /// Unsubscribes every observer from this subject.
    fn detach_all_observers(&self) {
        self.observers().detach_all();
    }

    /// Notifies every observer that this subject has changed.
    fn notify_observers(&self) -> usize {
        self.observers().notify(self)
    }
}
