use std::fmt;
use std::sync::Arc;

use super::payload::Payload;

/// A callback registered for inbound frames on a channel.
///
/// Identity is the handle, not the closure: clones of one `Listener` are the
/// same listener, two `Listener::new` calls with identical closures are not.
/// Keep the handle around to unsubscribe it later.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&Payload) + Send + Sync>);

impl Listener {
    pub fn new(f: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, payload: &Payload) {
        (self.0)(payload)
    }

    pub fn same_as(&self, other: &Listener) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Insertion-ordered listener set: adding a listener that is already present
/// is a no-op.
#[derive(Debug, Default, Clone)]
pub(crate) struct ListenerSet(Vec<Listener>);

impl ListenerSet {
    /// Returns false when the listener was already registered.
    pub fn insert(&mut self, listener: Listener) -> bool {
        if self.0.iter().any(|l| l.same_as(&listener)) {
            return false;
        }
        self.0.push(listener);
        true
    }

    pub fn remove(&mut self, listener: &Listener) -> bool {
        let before = self.0.len();
        self.0.retain(|l| !l.same_as(listener));
        before != self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn snapshot(&self) -> Vec<Listener> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let a = Listener::new(|_| {});
        let b = a.clone();
        let c = Listener::new(|_| {});
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn set_ignores_duplicates_and_keeps_order() {
        let a = Listener::new(|_| {});
        let b = Listener::new(|_| {});
        let mut set = ListenerSet::default();
        assert!(set.insert(a.clone()));
        assert!(set.insert(b.clone()));
        assert!(!set.insert(a.clone()));
        assert_eq!(set.len(), 2);
        let snapshot = set.snapshot();
        assert!(snapshot[0].same_as(&a));
        assert!(snapshot[1].same_as(&b));

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
    }
}
