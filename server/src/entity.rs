//! Entity data and the per-variant state each kind carries.
//!
//! The nine kinds form a closed set, so an entity is one struct with shared
//! kinematics plus an [`EntityState`] payload. The payload variant is chosen at
//! construction and never replaced, which makes [`Entity::kind`] stable for the
//! entity's whole life.

use crate::boss::BossState;
use shared::{Bounds, EntityKind, EntityView};

pub const PLAYER_SPEED: f32 = 250.0;
pub const PLAYER_WIDTH: f32 = 40.0;
pub const PLAYER_HEIGHT: f32 = 30.0;
pub const PLAYER_SPAWN: (f32, f32) = (380.0, 540.0);
pub const FIRE_COOLDOWN: f32 = 0.5;
pub const RESPAWN_GRACE: f32 = 1.5;
pub const STUN_DURATION: f32 = 1.5;
pub const MAX_UPGRADE: u32 = 3;

pub const ALIEN_SPEED: f32 = 75.0;
pub const ALIEN_HP: i32 = 200;
pub const ALIEN_WIDTH: f32 = 40.0;
pub const ALIEN_HEIGHT: f32 = 30.0;

pub const SHOT_SPEED: f32 = 300.0;
pub const SHOT_BASE_DAMAGE: i32 = 50;
pub const SHOT_WIDTH: f32 = 6.0;
pub const SHOT_HEIGHT: f32 = 16.0;

pub const ITEM_SPEED: f32 = 200.0;
pub const ITEM_SIZE: f32 = 24.0;
pub const ITEM_DESPAWN_Y: f32 = 700.0;

pub const METEOR_SPEED: f32 = 300.0;
pub const METEOR_SIZE: f32 = 40.0;
pub const METEOR_FRAMES: u8 = 16;
pub const METEOR_FRAME_TIME: f32 = 0.05;
pub const METEOR_DESPAWN_Y: f32 = 570.0;

pub const LASER_WIDTH: f32 = 30.0;
pub const LASER_DURATION: f32 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ShipState {
    /// Session that steers this ship; resolved by lookup, never held.
    pub owner: u32,
    pub upgrade_level: u32,
    pub fire_cooldown: f32,
    pub fire_requested: bool,
    /// Seconds left during which lethal contacts are ignored.
    pub grace: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    Player(ShipState),
    Alien { fire_chance: f64 },
    ReflectAlien,
    Shot { owner: u32, damage: i32 },
    AlienShot,
    Item,
    Meteor { frame: u8, frame_time: f32 },
    Boss(BossState),
    Laser { boss: u32, remaining: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub dx: f32,
    pub dy: f32,
    pub hp: Option<i32>,
    pub max_hp: Option<i32>,
    pub state: EntityState,
}

impl Entity {
    pub fn new(id: u32, x: f32, y: f32, width: f32, height: f32, state: EntityState) -> Self {
        Self {
            id,
            x,
            y,
            width,
            height,
            dx: 0.0,
            dy: 0.0,
            hp: None,
            max_hp: None,
            state,
        }
    }

    pub fn with_velocity(mut self, dx: f32, dy: f32) -> Self {
        self.dx = dx;
        self.dy = dy;
        self
    }

    pub fn with_health(mut self, hp: i32) -> Self {
        self.hp = Some(hp);
        self.max_hp = Some(hp);
        self
    }

    pub fn kind(&self) -> EntityKind {
        match self.state {
            EntityState::Player(_) => EntityKind::Player,
            EntityState::Alien { .. } => EntityKind::Alien,
            EntityState::ReflectAlien => EntityKind::ReflectAlien,
            EntityState::Shot { .. } => EntityKind::Shot,
            EntityState::AlienShot => EntityKind::AlienShot,
            EntityState::Item => EntityKind::Item,
            EntityState::Meteor { .. } => EntityKind::Meteor,
            EntityState::Boss(_) => EntityKind::Boss,
            EntityState::Laser { .. } => EntityKind::Laser,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    /// Advances position by one tick's worth of velocity.
    pub fn integrate(&mut self, dt: f32) {
        self.x += self.dx * dt;
        self.y += self.dy * dt;
    }

    pub fn ship(&self) -> Option<&ShipState> {
        match &self.state {
            EntityState::Player(ship) => Some(ship),
            _ => None,
        }
    }

    pub fn ship_mut(&mut self) -> Option<&mut ShipState> {
        match &mut self.state {
            EntityState::Player(ship) => Some(ship),
            _ => None,
        }
    }

    pub fn boss_mut(&mut self) -> Option<&mut BossState> {
        match &mut self.state {
            EntityState::Boss(boss) => Some(boss),
            _ => None,
        }
    }

    pub fn view(&self) -> EntityView {
        let frame = match self.state {
            EntityState::Meteor { frame, .. } => Some(frame),
            EntityState::Player(ShipState { upgrade_level, .. }) => Some(upgrade_level as u8),
            _ => None,
        };

        EntityView {
            id: self.id,
            kind: self.kind(),
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            hp: self.hp,
            frame,
        }
    }
}

/// Damage dealt by a player shot fired at the given upgrade level.
pub fn shot_damage(upgrade_level: u32) -> i32 {
    SHOT_BASE_DAMAGE * (upgrade_level as i32 + 1)
}
