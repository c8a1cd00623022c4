//! Pairwise AABB contact detection and per-kind collision reactions.
//!
//! Handlers never touch the registry. Each side of a contact reports what it
//! wants to happen to *itself* (or what it spawns) as a [`CollisionEvent`],
//! and the tick engine applies those intents. Both `react(a, b)` and
//! `react(b, a)` run for every contact, so paired effects such as a shot being
//! consumed while the alien takes damage come from two independent decisions.

use crate::entity::{Entity, EntityState};
use crate::registry::EntityRegistry;
use shared::{check_collision, EntityKind};

#[derive(Debug, Clone, PartialEq)]
pub enum CollisionEvent {
    Remove(u32),
    Damage {
        target: u32,
        amount: i32,
        /// Session credited if the damage kills.
        attacker: u32,
    },
    PlayerHit(u32),
    Stun(u32),
    Upgrade(u32),
    /// A reflect-alien turned a player shot around at this point.
    Reflect { x: f32, y: f32 },
}

pub fn overlaps(a: &Entity, b: &Entity) -> bool {
    check_collision(&a.bounds(), &b.bounds())
}

/// Reaction of `me` to touching `other`.
pub fn react(me: &Entity, other: &Entity, out: &mut Vec<CollisionEvent>) {
    let other_kind = other.kind();
    match &me.state {
        EntityState::Player(_) => match other_kind {
            EntityKind::Meteor => out.push(CollisionEvent::Stun(me.id)),
            EntityKind::Item => out.push(CollisionEvent::Upgrade(me.id)),
            kind if kind.is_lethal() => out.push(CollisionEvent::PlayerHit(me.id)),
            _ => {}
        },
        EntityState::Alien { .. } | EntityState::Boss(_) => {
            if let EntityState::Shot { owner, damage } = other.state {
                out.push(CollisionEvent::Damage {
                    target: me.id,
                    amount: damage,
                    attacker: owner,
                });
            }
        }
        EntityState::ReflectAlien => {
            if other_kind == EntityKind::Shot {
                let (x, _) = other.bounds().center();
                out.push(CollisionEvent::Reflect {
                    x,
                    y: me.y + me.height,
                });
            }
        }
        EntityState::Shot { .. } => {
            if matches!(
                other_kind,
                EntityKind::Alien | EntityKind::ReflectAlien | EntityKind::Boss
            ) {
                out.push(CollisionEvent::Remove(me.id));
            }
        }
        EntityState::AlienShot | EntityState::Item | EntityState::Meteor { .. } => {
            if other_kind == EntityKind::Player {
                out.push(CollisionEvent::Remove(me.id));
            }
        }
        EntityState::Laser { .. } => {}
    }
}

/// Receiver of collision intents. The resolver only reads the registry
/// through the sink, so the sink is free to mutate it between pairs.
pub trait CollisionSink {
    fn registry(&self) -> &EntityRegistry;
    fn apply(&mut self, event: CollisionEvent);
}

/// Walks every pair of entities present at the start of the pass. For each
/// contact both handlers run and the sink receives their combined intents
/// before the next pair is tested, so later pairs observe damage and
/// removal marks from earlier ones. Pairs involving an entity already marked
/// for removal are skipped. Returns the number of contacts.
pub fn resolve<S: CollisionSink>(sink: &mut S) -> usize {
    let ids = sink.registry().ids();
    let mut contacts = 0;

    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            let events = {
                let registry = sink.registry();
                if !registry.is_live(a) || !registry.is_live(b) {
                    continue;
                }
                let (Some(first), Some(second)) = (registry.get(a), registry.get(b)) else {
                    continue;
                };
                if !overlaps(first, second) {
                    continue;
                }

                let mut events = Vec::new();
                react(first, second, &mut events);
                react(second, first, &mut events);
                events
            };

            contacts += 1;
            for event in events {
                sink.apply(event);
            }
        }
    }

    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::*;
    use crate::factory;

    fn reactions(me: &Entity, other: &Entity) -> Vec<CollisionEvent> {
        let mut out = Vec::new();
        react(me, other, &mut out);
        out
    }

    #[test]
    fn test_shot_and_alien_react_independently() {
        let mut registry = EntityRegistry::new();
        let alien = factory::alien(&mut registry, 100.0, 50.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        let shot = factory::shot(&mut registry, 120.0, 80.0, 9, 0);
        let (alien_e, shot_e) = (registry.get(alien).unwrap(), registry.get(shot).unwrap());

        assert!(overlaps(alien_e, shot_e));
        assert_eq!(
            reactions(alien_e, shot_e),
            vec![CollisionEvent::Damage {
                target: alien,
                amount: 50,
                attacker: 9
            }]
        );
        assert_eq!(reactions(shot_e, alien_e), vec![CollisionEvent::Remove(shot)]);
    }

    #[test]
    fn test_player_reactions() {
        let mut registry = EntityRegistry::new();
        let ship = factory::player(&mut registry, 1);
        let meteor = factory::meteor(&mut registry, 0.0);
        let item = factory::item(&mut registry, 0.0, 0.0);
        let bullet = factory::alien_shot(&mut registry, 0.0, 0.0, 0.0);
        let ship_e = registry.get(ship).unwrap();

        assert_eq!(
            reactions(ship_e, registry.get(meteor).unwrap()),
            vec![CollisionEvent::Stun(ship)]
        );
        assert_eq!(
            reactions(ship_e, registry.get(item).unwrap()),
            vec![CollisionEvent::Upgrade(ship)]
        );
        assert_eq!(
            reactions(ship_e, registry.get(bullet).unwrap()),
            vec![CollisionEvent::PlayerHit(ship)]
        );
        assert_eq!(
            reactions(registry.get(bullet).unwrap(), ship_e),
            vec![CollisionEvent::Remove(bullet)]
        );
    }

    #[test]
    fn test_reflect_alien_turns_shot_around() {
        let mut registry = EntityRegistry::new();
        let reflect = factory::reflect_alien(&mut registry, 100.0, 50.0, ALIEN_SPEED);
        let shot = factory::shot(&mut registry, 120.0, 80.0, 1, 0);
        let (reflect_e, shot_e) = (registry.get(reflect).unwrap(), registry.get(shot).unwrap());

        assert_eq!(
            reactions(reflect_e, shot_e),
            vec![CollisionEvent::Reflect { x: 120.0, y: 80.0 }]
        );
        assert_eq!(reactions(shot_e, reflect_e), vec![CollisionEvent::Remove(shot)]);
    }

    #[test]
    fn test_friendly_contacts_do_nothing() {
        let mut registry = EntityRegistry::new();
        let a = factory::alien(&mut registry, 0.0, 0.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        let b = factory::alien(&mut registry, 10.0, 0.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        let shot = factory::alien_shot(&mut registry, 5.0, 5.0, 0.0);

        let (a_e, b_e) = (registry.get(a).unwrap(), registry.get(b).unwrap());
        assert!(reactions(a_e, b_e).is_empty());
        assert!(reactions(a_e, registry.get(shot).unwrap()).is_empty());
    }

    /// Marks removals and kills anything that takes damage.
    struct Recorder {
        registry: EntityRegistry,
        seen: Vec<CollisionEvent>,
    }

    impl CollisionSink for Recorder {
        fn registry(&self) -> &EntityRegistry {
            &self.registry
        }

        fn apply(&mut self, event: CollisionEvent) {
            match &event {
                CollisionEvent::Remove(id) => self.registry.mark_for_removal(*id),
                CollisionEvent::Damage { target, .. } => self.registry.mark_for_removal(*target),
                _ => {}
            }
            self.seen.push(event);
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            registry: EntityRegistry::new(),
            seen: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_delivers_both_sides() {
        let mut sink = recorder();
        factory::alien(&mut sink.registry, 100.0, 50.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        factory::shot(&mut sink.registry, 120.0, 80.0, 1, 0);
        factory::alien_shot(&mut sink.registry, 700.0, 300.0, 0.0);

        let contacts = resolve(&mut sink);

        assert_eq!(contacts, 1);
        assert_eq!(sink.seen.len(), 2);
    }

    #[test]
    fn test_resolve_skips_entities_marked_earlier_in_pass() {
        let mut sink = recorder();
        let alien = factory::alien(&mut sink.registry, 100.0, 50.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        let first = factory::shot(&mut sink.registry, 120.0, 80.0, 1, 0);
        let second = factory::shot(&mut sink.registry, 125.0, 80.0, 1, 0);

        resolve(&mut sink);

        let damage_events = sink
            .seen
            .iter()
            .filter(|e| matches!(e, CollisionEvent::Damage { .. }))
            .count();
        assert_eq!(damage_events, 1);
        assert!(sink.registry.is_pending_removal(alien));
        assert!(sink.registry.is_pending_removal(first));
        assert!(!sink.registry.is_pending_removal(second));
    }
}
