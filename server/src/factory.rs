//! Typed constructors. Each one allocates an id, applies the kind's default
//! size, velocity and health, registers the entity and returns its id.

use crate::boss::{BossState, BOSS_HEIGHT, BOSS_HP, BOSS_SPEED, BOSS_WIDTH};
use crate::entity::*;
use crate::registry::EntityRegistry;
use shared::{WORLD_HEIGHT, WORLD_WIDTH};

pub fn player(registry: &mut EntityRegistry, owner: u32) -> u32 {
    let id = registry.allocate();
    let (x, y) = PLAYER_SPAWN;
    registry.add(Entity::new(
        id,
        x,
        y,
        PLAYER_WIDTH,
        PLAYER_HEIGHT,
        EntityState::Player(ShipState {
            owner,
            upgrade_level: 0,
            fire_cooldown: 0.0,
            fire_requested: false,
            grace: 0.0,
        }),
    ));
    id
}

/// Patrolling alien heading right at `speed`.
pub fn alien(
    registry: &mut EntityRegistry,
    x: f32,
    y: f32,
    hp: i32,
    speed: f32,
    fire_chance: f64,
) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            x,
            y,
            ALIEN_WIDTH,
            ALIEN_HEIGHT,
            EntityState::Alien { fire_chance },
        )
        .with_velocity(speed, 0.0)
        .with_health(hp),
    );
    id
}

pub fn reflect_alien(registry: &mut EntityRegistry, x: f32, y: f32, speed: f32) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            x,
            y,
            ALIEN_WIDTH,
            ALIEN_HEIGHT,
            EntityState::ReflectAlien,
        )
        .with_velocity(speed, 0.0),
    );
    id
}

/// Player shot whose bottom edge starts at `y`, centred on `center_x`.
pub fn shot(
    registry: &mut EntityRegistry,
    center_x: f32,
    y: f32,
    owner: u32,
    upgrade_level: u32,
) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            center_x - SHOT_WIDTH / 2.0,
            y - SHOT_HEIGHT,
            SHOT_WIDTH,
            SHOT_HEIGHT,
            EntityState::Shot {
                owner,
                damage: shot_damage(upgrade_level),
            },
        )
        .with_velocity(0.0, -SHOT_SPEED),
    );
    id
}

/// Downward enemy shot centred on `center_x`; `dx` is non-zero for the
/// boss shotgun fan.
pub fn alien_shot(registry: &mut EntityRegistry, center_x: f32, y: f32, dx: f32) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            center_x - SHOT_WIDTH / 2.0,
            y,
            SHOT_WIDTH,
            SHOT_HEIGHT,
            EntityState::AlienShot,
        )
        .with_velocity(dx, SHOT_SPEED),
    );
    id
}

pub fn item(registry: &mut EntityRegistry, x: f32, y: f32) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(id, x, y, ITEM_SIZE, ITEM_SIZE, EntityState::Item)
            .with_velocity(0.0, ITEM_SPEED),
    );
    id
}

pub fn meteor(registry: &mut EntityRegistry, x: f32) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            x,
            -METEOR_SIZE,
            METEOR_SIZE,
            METEOR_SIZE,
            EntityState::Meteor {
                frame: 0,
                frame_time: 0.0,
            },
        )
        .with_velocity(0.0, METEOR_SPEED),
    );
    id
}

/// Boss centred horizontally near the top of the world.
pub fn boss(registry: &mut EntityRegistry) -> u32 {
    let id = registry.allocate();
    registry.add(
        Entity::new(
            id,
            (WORLD_WIDTH - BOSS_WIDTH) / 2.0,
            20.0,
            BOSS_WIDTH,
            BOSS_HEIGHT,
            EntityState::Boss(BossState::new()),
        )
        .with_velocity(BOSS_SPEED, 0.0)
        .with_health(BOSS_HP),
    );
    id
}

/// Laser beam hanging below the boss it belongs to. It only stores the
/// boss id and re-resolves it every tick.
pub fn laser(registry: &mut EntityRegistry, boss_id: u32) -> Option<u32> {
    let (x, bottom) = {
        let boss = registry.get(boss_id)?;
        (boss.x + (boss.width - LASER_WIDTH) / 2.0, boss.y + boss.height)
    };

    let id = registry.allocate();
    registry.add(Entity::new(
        id,
        x,
        bottom,
        LASER_WIDTH,
        (WORLD_HEIGHT - bottom).max(0.0),
        EntityState::Laser {
            boss: boss_id,
            remaining: LASER_DURATION,
        },
    ));
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::EntityKind;

    #[test]
    fn test_player_defaults() {
        let mut registry = EntityRegistry::new();
        let id = player(&mut registry, 7);
        let ship = registry.get(id).unwrap();

        assert_eq!(ship.kind(), EntityKind::Player);
        assert_eq!((ship.x, ship.y), PLAYER_SPAWN);
        assert_eq!(ship.ship().unwrap().owner, 7);
        assert_eq!(ship.ship().unwrap().upgrade_level, 0);
    }

    #[test]
    fn test_alien_defaults() {
        let mut registry = EntityRegistry::new();
        let id = alien(&mut registry, 100.0, 50.0, ALIEN_HP, ALIEN_SPEED, 0.0);
        let alien = registry.get(id).unwrap();

        assert_eq!(alien.hp, Some(200));
        assert_eq!(alien.max_hp, Some(200));
        assert_eq!(alien.dx, 75.0);
        assert_eq!(alien.dy, 0.0);
    }

    #[test]
    fn test_reflect_alien_has_no_health() {
        let mut registry = EntityRegistry::new();
        let id = reflect_alien(&mut registry, 0.0, 0.0, ALIEN_SPEED);
        let reflect = registry.get(id).unwrap();
        assert_eq!(reflect.kind(), EntityKind::ReflectAlien);
        assert!(reflect.hp.is_none());
        assert_eq!(reflect.dx, 75.0);
    }

    #[test]
    fn test_shot_moves_up_with_scaled_damage() {
        let mut registry = EntityRegistry::new();
        let id = shot(&mut registry, 400.0, 540.0, 1, 2);
        let shot = registry.get(id).unwrap();

        assert_eq!(shot.dy, -300.0);
        assert_eq!(shot.x, 397.0);
        assert_eq!(shot.y, 524.0);
        match shot.state {
            EntityState::Shot { owner, damage } => {
                assert_eq!(owner, 1);
                assert_eq!(damage, 150);
            }
            _ => panic!("Wrong entity state"),
        }
    }

    #[test]
    fn test_falling_entities() {
        let mut registry = EntityRegistry::new();
        let shot = alien_shot(&mut registry, 100.0, 100.0, -60.0);
        let item = item(&mut registry, 100.0, 100.0);
        let meteor = meteor(&mut registry, 300.0);

        assert_eq!(registry.get(shot).unwrap().dy, 300.0);
        assert_eq!(registry.get(shot).unwrap().dx, -60.0);
        assert_eq!(registry.get(item).unwrap().dy, 200.0);
        assert_eq!(registry.get(meteor).unwrap().dy, 300.0);
    }

    #[test]
    fn test_boss_and_laser() {
        let mut registry = EntityRegistry::new();
        let boss_id = boss(&mut registry);
        let boss = registry.get(boss_id).unwrap().clone();
        assert_eq!(boss.hp, Some(5000));
        assert_eq!(boss.dx, 50.0);

        let laser_id = laser(&mut registry, boss_id).unwrap();
        let laser = registry.get(laser_id).unwrap();
        assert_eq!(laser.y, boss.y + boss.height);
        assert_eq!(laser.y + laser.height, WORLD_HEIGHT);
        match laser.state {
            EntityState::Laser { boss, remaining } => {
                assert_eq!(boss, boss_id);
                assert_eq!(remaining, LASER_DURATION);
            }
            _ => panic!("Wrong entity state"),
        }

        assert!(super::laser(&mut registry, 999).is_none());
    }
}
