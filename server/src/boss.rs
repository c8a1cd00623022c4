//! Boss phase machine.
//!
//! ```text
//! Patrolling --cooldown--> Summon | Shotgun --> Patrolling
//!            \-----------> Charging(2s) --> FiringLaser(4s) --> Patrolling
//! ```

use crate::factory;
use crate::registry::EntityRegistry;
use log::{debug, info};
use rand::Rng;
use shared::WORLD_WIDTH;

pub const BOSS_HP: i32 = 5000;
pub const BOSS_SPEED: f32 = 50.0;
pub const BOSS_WIDTH: f32 = 160.0;
pub const BOSS_HEIGHT: f32 = 100.0;
pub const BOSS_KILL_BONUS: u64 = 5000;
pub const PATTERN_COOLDOWN: f32 = 5.0;
pub const CHARGE_TIME: f32 = 2.0;
pub const LASER_TIME: f32 = 4.0;
pub const MINION_COUNT: u32 = 5;
pub const MINION_HP: i32 = 50;
pub const SHOTGUN_SPREAD: [f32; 5] = [-120.0, -60.0, 0.0, 60.0, 120.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BossPattern {
    Summon,
    Shotgun,
    Laser,
}

impl BossPattern {
    pub fn choose<R: Rng>(rng: &mut R) -> Self {
        match rng.gen_range(0..3) {
            0 => BossPattern::Summon,
            1 => BossPattern::Shotgun,
            _ => BossPattern::Laser,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BossPhase {
    Patrolling { cooldown: f32 },
    Charging { remaining: f32 },
    FiringLaser { remaining: f32, laser: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BossState {
    pub phase: BossPhase,
    /// Horizontal velocity to restore once a charge ends.
    pub heading: f32,
}

impl BossState {
    pub fn new() -> Self {
        Self {
            phase: BossPhase::Patrolling {
                cooldown: PATTERN_COOLDOWN,
            },
            heading: BOSS_SPEED,
        }
    }

    pub fn is_charging(&self) -> bool {
        matches!(self.phase, BossPhase::Charging { .. })
    }
}

impl Default for BossState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a controller step did, so the caller can keep the stage quota honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BossEvent {
    Summoned(u32),
    FiredShotgun,
    StartedCharge,
    FiredLaser(u32),
    LaserFinished,
}

/// Bounces the boss between the world edges unless it is charging.
pub fn patrol(registry: &mut EntityRegistry, boss_id: u32) {
    let Some(boss) = registry.get_mut(boss_id) else {
        return;
    };
    let (x, width) = (boss.x, boss.width);
    let Some(state) = boss.boss_mut() else {
        return;
    };

    if state.is_charging() {
        boss.dx = 0.0;
        return;
    }

    if (x <= 0.0 && state.heading < 0.0) || (x + width >= WORLD_WIDTH && state.heading > 0.0) {
        state.heading = -state.heading;
    }
    let heading = state.heading;
    boss.dx = heading;
}

/// Advances the boss's phase timers by `dt` and executes any pattern that
/// comes due. A missing boss id is a no-op.
pub fn step<R: Rng>(
    registry: &mut EntityRegistry,
    boss_id: u32,
    dt: f32,
    rng: &mut R,
) -> Option<BossEvent> {
    if !registry.is_live(boss_id) {
        return None;
    }

    let pattern = {
        let boss = registry.get_mut(boss_id)?;
        let state = boss.boss_mut()?;
        match &mut state.phase {
            BossPhase::Patrolling { cooldown } => {
                *cooldown -= dt;
                if *cooldown > 0.0 {
                    return None;
                }
                *cooldown = PATTERN_COOLDOWN;
                BossPattern::choose(rng)
            }
            BossPhase::Charging { remaining } => {
                *remaining -= dt;
                if *remaining > 0.0 {
                    return None;
                }
                return fire_laser(registry, boss_id);
            }
            BossPhase::FiringLaser { remaining, .. } => {
                *remaining -= dt;
                if *remaining > 0.0 {
                    return None;
                }
                state.phase = BossPhase::Patrolling {
                    cooldown: PATTERN_COOLDOWN,
                };
                debug!("Boss {} laser finished", boss_id);
                return Some(BossEvent::LaserFinished);
            }
        }
    };

    debug!("Boss {} executes {:?}", boss_id, pattern);
    match pattern {
        BossPattern::Summon => Some(BossEvent::Summoned(summon(registry, boss_id))),
        BossPattern::Shotgun => {
            shotgun(registry, boss_id);
            Some(BossEvent::FiredShotgun)
        }
        BossPattern::Laser => {
            let boss = registry.get_mut(boss_id)?;
            if let Some(state) = boss.boss_mut() {
                state.phase = BossPhase::Charging {
                    remaining: CHARGE_TIME,
                };
            }
            boss.dx = 0.0;
            Some(BossEvent::StartedCharge)
        }
    }
}

fn fire_laser(registry: &mut EntityRegistry, boss_id: u32) -> Option<BossEvent> {
    let laser = factory::laser(registry, boss_id);
    let boss = registry.get_mut(boss_id)?;
    if let Some(state) = boss.boss_mut() {
        state.phase = BossPhase::FiringLaser {
            remaining: LASER_TIME,
            laser,
        };
        let heading = state.heading;
        boss.dx = heading;
    }
    info!("Boss {} fires laser {:?}", boss_id, laser);
    laser.map(BossEvent::FiredLaser)
}

/// Spawns minions on both flanks of the boss and returns how many.
fn summon(registry: &mut EntityRegistry, boss_id: u32) -> u32 {
    let Some(boss) = registry.get(boss_id) else {
        return 0;
    };
    let (bx, by, bw, bh) = (boss.x, boss.y, boss.width, boss.height);
    let minion_y = by + bh + 10.0;
    let spots = [
        bx - 90.0,
        bx - 45.0,
        bx + bw / 2.0 - 20.0,
        bx + bw + 5.0,
        bx + bw + 50.0,
    ];

    for x in spots.iter().take(MINION_COUNT as usize) {
        let x = x.clamp(0.0, WORLD_WIDTH - crate::entity::ALIEN_WIDTH);
        factory::alien(
            registry,
            x,
            minion_y,
            MINION_HP,
            crate::entity::ALIEN_SPEED,
            0.0,
        );
    }
    MINION_COUNT
}

fn shotgun(registry: &mut EntityRegistry, boss_id: u32) {
    let Some(boss) = registry.get(boss_id) else {
        return;
    };
    let (center_x, bottom) = (boss.x + boss.width / 2.0, boss.y + boss.height);
    for dx in SHOTGUN_SPREAD {
        factory::alien_shot(registry, center_x, bottom, dx);
    }
}
