//! Staleness notifications emitted by movement monitors.

use clipwave_env::{NodeId, Position, SimTime};
use serde::{Deserialize, Serialize};

/// What a monitor reports after deciding a node's indexed position needed
/// attention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// The node moved at least the displacement threshold since its last
    /// recorded position
    PositionChange {
        node: NodeId,
        position: Position,
        time: SimTime,
    },

    /// The refresh interval elapsed without a qualifying displacement
    Timeout { node: NodeId, time: SimTime },
}

/// Discriminant of a `Notification`, used for typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    PositionChange,
    Timeout,
}

impl Notification {
    pub fn node(&self) -> NodeId {
        match self {
            Notification::PositionChange { node, .. } | Notification::Timeout { node, .. } => *node,
        }
    }

    pub fn time(&self) -> SimTime {
        match self {
            Notification::PositionChange { time, .. } | Notification::Timeout { time, .. } => *time,
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::PositionChange { .. } => NotificationKind::PositionChange,
            Notification::Timeout { .. } => NotificationKind::Timeout,
        }
    }
}

type Observer = Box<dyn FnMut(&Notification)>;

/// Fan-out point for notifications.
///
/// Observers registered for a kind only see that kind; observers registered
/// with `subscribe_all` see everything. Delivery follows emission order, so
/// notifications for one node always arrive in the order they happened.
#[derive(Default)]
pub struct NotificationBus {
    observers: Vec<(Option<NotificationKind>, Observer)>,
    delivered: u64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for every notification.
    pub fn subscribe_all(&mut self, observer: impl FnMut(&Notification) + 'static) {
        self.observers.push((None, Box::new(observer)));
    }

    /// Registers an observer for position changes only.
    pub fn on_position_change(&mut self, observer: impl FnMut(&Notification) + 'static) {
        self.observers.push((Some(NotificationKind::PositionChange), Box::new(observer)));
    }

    /// Registers an observer for timeouts only.
    pub fn on_timeout(&mut self, observer: impl FnMut(&Notification) + 'static) {
        self.observers.push((Some(NotificationKind::Timeout), Box::new(observer)));
    }

    /// Delivers a notification to every matching observer.
    pub fn publish(&mut self, notification: &Notification) {
        let kind = notification.kind();
        for (filter, observer) in self.observers.iter_mut() {
            if filter.map_or(true, |f| f == kind) {
                observer(notification);
            }
        }
        self.delivered += 1;
    }

    /// Number of notifications published so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("observers", &self.observers.len())
            .field("delivered", &self.delivered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_typed_subscriptions_filter_by_kind() {
        let mut bus = NotificationBus::new();
        let changes = Rc::new(RefCell::new(0));
        let timeouts = Rc::new(RefCell::new(0));
        let all = Rc::new(RefCell::new(Vec::new()));

        let c = Rc::clone(&changes);
        bus.on_position_change(move |_| *c.borrow_mut() += 1);
        let t = Rc::clone(&timeouts);
        bus.on_timeout(move |_| *t.borrow_mut() += 1);
        let a = Rc::clone(&all);
        bus.subscribe_all(move |n| a.borrow_mut().push(n.kind()));

        let node = NodeId::from_seed(1);
        bus.publish(&Notification::Timeout { node, time: Duration::from_secs(4) });
        bus.publish(&Notification::PositionChange {
            node,
            position: Position::new(50.0, 0.0, 0.0),
            time: Duration::from_millis(4500),
        });

        assert_eq!(*changes.borrow(), 1);
        assert_eq!(*timeouts.borrow(), 1);
        assert_eq!(
            *all.borrow(),
            vec![NotificationKind::Timeout, NotificationKind::PositionChange]
        );
        assert_eq!(bus.delivered(), 2);
    }

    #[test]
    fn test_notification_accessors() {
        let node = NodeId::from_seed(3);
        let n = Notification::Timeout { node, time: Duration::from_secs(8) };
        assert_eq!(n.node(), node);
        assert_eq!(n.time(), Duration::from_secs(8));
        assert_eq!(n.kind(), NotificationKind::Timeout);
    }
}
