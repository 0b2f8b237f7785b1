use crate::pointer::PointerEvent;
use parallax_common::ListenerScope;
use std::collections::BTreeMap;

/// Identifier of one attached pointer-move listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Handle returned by [`PointerRouter::subscribe`]. Not `Clone`: the owner
/// detaches it exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    scope: ListenerScope,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn scope(&self) -> ListenerScope {
        self.scope
    }
}

/// Host-owned registry of pointer-move listeners.
///
/// The host feeds every pointer sample through [`PointerRouter::deliver`]
/// and forwards it to the owners of the returned subscriptions.
#[derive(Debug, Default)]
pub struct PointerRouter {
    listeners: BTreeMap<SubscriptionId, ListenerScope>,
    next_id: u64,
}

impl PointerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener for the given scope.
    pub fn subscribe(&mut self, scope: ListenerScope) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(id, scope);
        tracing::debug!(id = id.0, %scope, "pointer listener attached");
        Subscription { id, scope }
    }

    /// Detach a listener. Returns false if it was not attached.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let removed = self.listeners.remove(&subscription.id).is_some();
        if removed {
            tracing::debug!(id = subscription.id.0, "pointer listener detached");
        }
        removed
    }

    pub fn is_attached(&self, id: SubscriptionId) -> bool {
        self.listeners.contains_key(&id)
    }

    /// Subscriptions that receive this event: window-scoped listeners always,
    /// surface-scoped listeners only while the pointer is over the surface.
    pub fn deliver(&self, event: &PointerEvent) -> Vec<SubscriptionId> {
        self.listeners
            .iter()
            .filter(|(_, scope)| match scope {
                ListenerScope::Window => true,
                ListenerScope::Surface => event.over_surface(),
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of attached listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use parallax_common::Rect;

    fn bounds() -> Rect {
        Rect::new(Vec2::ZERO, Vec2::new(200.0, 200.0))
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let mut router = PointerRouter::new();
        let sub = router.subscribe(ListenerScope::Window);
        let id = sub.id();
        assert!(router.is_attached(id));
        assert_eq!(router.len(), 1);
        assert!(router.unsubscribe(sub));
        assert!(!router.is_attached(id));
        assert!(router.is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut router = PointerRouter::new();
        let a = router.subscribe(ListenerScope::Window);
        let a_id = a.id();
        router.unsubscribe(a);
        let b = router.subscribe(ListenerScope::Window);
        assert_ne!(a_id, b.id());
    }

    #[test]
    fn window_scope_receives_everything() {
        let mut router = PointerRouter::new();
        let sub = router.subscribe(ListenerScope::Window);
        let outside = PointerEvent::new(Vec2::new(500.0, 500.0), Vec2::new(1000.0, 1000.0))
            .with_surface_bounds(bounds());
        assert_eq!(router.deliver(&outside), vec![sub.id()]);
    }

    #[test]
    fn surface_scope_requires_pointer_over_surface() {
        let mut router = PointerRouter::new();
        let sub = router.subscribe(ListenerScope::Surface);
        let viewport = Vec2::new(1000.0, 1000.0);
        let outside =
            PointerEvent::new(Vec2::new(500.0, 500.0), viewport).with_surface_bounds(bounds());
        let inside =
            PointerEvent::new(Vec2::new(50.0, 50.0), viewport).with_surface_bounds(bounds());
        assert!(router.deliver(&outside).is_empty());
        assert_eq!(router.deliver(&inside), vec![sub.id()]);
    }

    #[test]
    fn detached_listener_receives_nothing() {
        let mut router = PointerRouter::new();
        let sub = router.subscribe(ListenerScope::Window);
        router.unsubscribe(sub);
        let ev = PointerEvent::new(Vec2::new(1.0, 1.0), Vec2::new(10.0, 10.0));
        assert!(router.deliver(&ev).is_empty());
    }
}
