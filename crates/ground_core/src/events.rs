//! Event fan-out from the locomotion core.
//!
//! Events are queued during the tick and delivered synchronously afterwards,
//! in emission order, to listeners in registration order. Listeners read
//! state; they never mutate the core from inside a callback.

use serde::{Deserialize, Serialize};

use crate::features::{FeatureDrawType, FeatureId};
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::unit::UnitId;

/// A notification emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A unit's position changed meaningfully this tick.
    UnitMoved {
        /// The unit that moved.
        unit: UnitId,
    },
    /// A move order was abandoned.
    UnitMoveFailed {
        /// The unit that gave up.
        unit: UnitId,
    },
    /// Two units came into contact.
    UnitUnitCollision {
        /// The moving party.
        collider: UnitId,
        /// The party it ran into.
        collidee: UnitId,
    },
    /// A unit came into contact with a feature.
    UnitFeatureCollision {
        /// The moving party.
        collider: UnitId,
        /// The feature it ran into.
        collidee: FeatureId,
    },
    /// A feature was displaced; the render layer must follow.
    RenderFeatureMoved {
        /// The feature that moved.
        feature: FeatureId,
        /// Position before the shove.
        old_pos: Vec3Fixed,
        /// Position after the shove.
        new_pos: Vec3Fixed,
        /// Render classification of the feature.
        draw_type: FeatureDrawType,
    },
    /// A feature was destroyed.
    RenderFeatureDestroyed {
        /// The feature that was destroyed.
        feature: FeatureId,
        /// Its final position.
        pos: Vec3Fixed,
        /// Its velocity at death (topple direction for trees).
        speed: Vec3Fixed,
        /// Render classification of the feature.
        draw_type: FeatureDrawType,
    },
}

/// An explosion offered to subscribers before its graphics are spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explosion {
    /// Center of the blast.
    pub pos: Vec3Fixed,
    /// Blast radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Nominal damage at the center.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
}

/// A subscriber on the event bus.
pub trait EventListener {
    /// Handle a queued event. Must not mutate core state.
    fn on_event(&mut self, _event: &Event) {}

    /// Handle an explosion; returning `true` suppresses its default
    /// graphics.
    fn on_explosion(&mut self, _explosion: &Explosion) -> bool {
        false
    }
}

/// Registration-ordered fan-out of queued events.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; delivery order follows registration order.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver a batch of events, each to every listener in order.
    pub fn deliver(&mut self, events: &[Event]) {
        for event in events {
            for listener in &mut self.listeners {
                listener.on_event(event);
            }
        }
    }

    /// Offer an explosion to every listener; true when any listener
    /// suppresses the default graphics.
    pub fn fire_explosion(&mut self, explosion: &Explosion) -> bool {
        let mut suppress = false;
        for listener in &mut self.listeners {
            suppress |= listener.on_explosion(explosion);
        }
        suppress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Event>,
        suppress: bool,
    }

    impl EventListener for Recorder {
        fn on_event(&mut self, event: &Event) {
            self.seen.push(*event);
        }

        fn on_explosion(&mut self, _explosion: &Explosion) -> bool {
            self.suppress
        }
    }

    #[test]
    fn test_delivery_preserves_emission_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Shared(Rc<RefCell<Vec<Event>>>);
        impl EventListener for Shared {
            fn on_event(&mut self, event: &Event) {
                self.0.borrow_mut().push(*event);
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.add_listener(Box::new(Shared(Rc::clone(&log))));

        let events = vec![
            Event::UnitMoved { unit: 1 },
            Event::UnitMoveFailed { unit: 2 },
        ];
        bus.deliver(&events);
        assert_eq!(*log.borrow(), events);
    }

    #[test]
    fn test_explosion_suppression_fan_in() {
        let mut bus = EventBus::new();
        bus.add_listener(Box::new(Recorder::default()));
        bus.add_listener(Box::new(Recorder {
            suppress: true,
            ..Default::default()
        }));

        let boom = Explosion {
            pos: Vec3Fixed::ZERO,
            radius: Fixed::from_num(10),
            damage: Fixed::from_num(50),
        };
        assert!(bus.fire_explosion(&boom));
    }
}
