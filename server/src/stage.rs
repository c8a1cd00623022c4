//! Wave list and quota-driven stage progression.

use crate::entity::ALIEN_WIDTH;
use crate::factory;
use crate::registry::EntityRegistry;
use log::info;
use shared::{EntityKind, WORLD_WIDTH};

/// Multiplier applied to every patrolling enemy's speed per alien kill.
pub const SPEED_SCALE_PER_KILL: f32 = 1.02;
pub const ITEM_DROP_CHANCE: f64 = 0.2;
pub const METEOR_CHANCE: f64 = 0.003;
/// First wave index on which meteors start falling.
pub const METEOR_MIN_STAGE: usize = 2;

const GRID_SPACING_X: f32 = 60.0;
const GRID_SPACING_Y: f32 = 45.0;
const GRID_TOP: f32 = 60.0;

/// Immutable description of one wave.
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    pub rows: u32,
    pub cols: u32,
    pub alien_hp: i32,
    pub alien_speed: f32,
    pub reflect_aliens: u32,
    /// Per-alien probability of firing on any given tick.
    pub fire_chance: f64,
}

impl Wave {
    /// Spawns the wave's formation and returns the alien quota it sets.
    /// Reflect-aliens ride along in a row above the grid and do not count.
    pub fn spawn(&self, registry: &mut EntityRegistry) -> u32 {
        let grid_width = (self.cols.saturating_sub(1)) as f32 * GRID_SPACING_X + ALIEN_WIDTH;
        let left = ((WORLD_WIDTH - grid_width) / 2.0).max(0.0);
        let grid_top = if self.reflect_aliens > 0 {
            GRID_TOP + GRID_SPACING_Y
        } else {
            GRID_TOP
        };

        for i in 0..self.reflect_aliens {
            let spacing = grid_width / self.reflect_aliens as f32;
            let x = left + spacing * i as f32 + (spacing - ALIEN_WIDTH) / 2.0;
            factory::reflect_alien(registry, x, GRID_TOP, self.alien_speed);
        }

        for row in 0..self.rows {
            for col in 0..self.cols {
                factory::alien(
                    registry,
                    left + col as f32 * GRID_SPACING_X,
                    grid_top + row as f32 * GRID_SPACING_Y,
                    self.alien_hp,
                    self.alien_speed,
                    self.fire_chance,
                );
            }
        }

        self.rows * self.cols
    }
}

pub fn default_waves() -> Vec<Wave> {
    vec![
        Wave {
            rows: 2,
            cols: 6,
            alien_hp: 200,
            alien_speed: 75.0,
            reflect_aliens: 0,
            fire_chance: 0.0004,
        },
        Wave {
            rows: 3,
            cols: 6,
            alien_hp: 200,
            alien_speed: 75.0,
            reflect_aliens: 0,
            fire_chance: 0.0006,
        },
        Wave {
            rows: 3,
            cols: 7,
            alien_hp: 250,
            alien_speed: 85.0,
            reflect_aliens: 2,
            fire_chance: 0.0008,
        },
        Wave {
            rows: 4,
            cols: 7,
            alien_hp: 300,
            alien_speed: 95.0,
            reflect_aliens: 3,
            fire_chance: 0.001,
        },
        Wave {
            rows: 4,
            cols: 8,
            alien_hp: 350,
            alien_speed: 100.0,
            reflect_aliens: 4,
            fire_chance: 0.0012,
        },
    ]
}

/// Result of [`StageDirector::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NextStage(usize),
    BossSpawned(u32),
    Finished,
}

#[derive(Debug)]
pub struct StageDirector {
    waves: Vec<Wave>,
    index: usize,
    quota: u32,
    boss_spawned: bool,
}

impl StageDirector {
    pub fn new(waves: Vec<Wave>) -> Self {
        Self {
            waves,
            index: 0,
            quota: 0,
            boss_spawned: false,
        }
    }

    /// Spawns the first wave.
    pub fn start(&mut self, registry: &mut EntityRegistry) {
        self.index = 0;
        self.boss_spawned = false;
        self.quota = self.waves.first().map_or(0, |wave| wave.spawn(registry));
        info!("Stage 0 started with quota {}", self.quota);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Kills still needed to clear the current stage.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn boss_spawned(&self) -> bool {
        self.boss_spawned
    }

    pub fn is_final_stage(&self) -> bool {
        self.index + 1 >= self.waves.len()
    }

    /// Raises the quota for aliens that join mid-stage, such as boss minions.
    pub fn add_quota(&mut self, amount: u32) {
        self.quota += amount;
    }

    /// Records one alien kill. Returns true exactly when this kill brings the
    /// quota to zero; further kills at zero are ignored.
    pub fn record_kill(&mut self) -> bool {
        if self.quota == 0 {
            return false;
        }
        self.quota -= 1;
        self.quota == 0
    }

    /// Clears every non-player entity, then spawns the boss on the final
    /// stage, the next wave otherwise, or reports that nothing remains.
    pub fn advance(&mut self, registry: &mut EntityRegistry) -> Progress {
        let doomed: Vec<u32> = registry
            .iter()
            .filter(|e| e.kind() != EntityKind::Player)
            .map(|e| e.id)
            .collect();
        for id in doomed {
            registry.mark_for_removal(id);
        }

        if self.is_final_stage() && !self.boss_spawned {
            self.boss_spawned = true;
            self.quota = 1;
            let boss = factory::boss(registry);
            info!("Stage {} cleared, boss {} spawned", self.index, boss);
            return Progress::BossSpawned(boss);
        }

        if self.is_final_stage() {
            self.quota = 0;
            info!("All stages cleared");
            return Progress::Finished;
        }

        self.index += 1;
        self.quota = self.waves[self.index].spawn(registry);
        info!("Stage {} started with quota {}", self.index, self.quota);
        Progress::NextStage(self.index)
    }

    /// Meteors fall from the third stage on.
    pub fn meteors_enabled(&self) -> bool {
        self.index >= METEOR_MIN_STAGE
    }
}

impl Default for StageDirector {
    fn default() -> Self {
        Self::new(default_waves())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn director_at(index: usize, registry: &mut EntityRegistry) -> StageDirector {
        let mut director = StageDirector::default();
        director.start(registry);
        while director.index() < index {
            director.advance(registry);
        }
        registry.flush_removals();
        director
    }

    #[test]
    fn test_first_wave_sets_quota() {
        let mut registry = EntityRegistry::new();
        let director = director_at(0, &mut registry);

        assert_eq!(director.quota(), 12);
        assert_eq!(registry.live_ids_of(EntityKind::Alien).len(), 12);
        assert!(!director.meteors_enabled());
    }

    #[test]
    fn test_reflect_aliens_do_not_count() {
        let mut registry = EntityRegistry::new();
        let director = director_at(2, &mut registry);

        assert_eq!(director.quota(), 21);
        assert_eq!(registry.live_ids_of(EntityKind::ReflectAlien).len(), 2);
        assert!(director.meteors_enabled());
    }

    #[test]
    fn test_record_kill_triggers_once_and_never_goes_negative() {
        let mut director = StageDirector::new(default_waves());
        director.add_quota(2);

        assert!(!director.record_kill());
        assert!(director.record_kill());
        assert_eq!(director.quota(), 0);
        assert!(!director.record_kill());
        assert_eq!(director.quota(), 0);
    }

    #[test]
    fn test_advance_clears_non_player_entities() {
        let mut registry = EntityRegistry::new();
        let mut director = director_at(0, &mut registry);
        let player = factory::player(&mut registry, 1);
        let old_aliens = registry.live_ids_of(EntityKind::Alien);

        assert_eq!(director.advance(&mut registry), Progress::NextStage(1));
        for id in &old_aliens {
            assert!(registry.is_pending_removal(*id));
        }
        assert!(registry.is_live(player));

        registry.flush_removals();
        assert_eq!(registry.live_ids_of(EntityKind::Alien).len(), 18);
        assert_eq!(director.quota(), 18);
    }

    #[test]
    fn test_final_stage_spawns_boss_instead_of_stage_five() {
        let mut registry = EntityRegistry::new();
        let mut director = director_at(4, &mut registry);
        assert!(director.is_final_stage());

        let progress = director.advance(&mut registry);
        registry.flush_removals();

        let bosses = registry.live_ids_of(EntityKind::Boss);
        assert_eq!(bosses.len(), 1);
        assert_eq!(progress, Progress::BossSpawned(bosses[0]));
        assert_eq!(director.index(), 4);
        assert_eq!(director.quota(), 1);
        assert!(registry.live_ids_of(EntityKind::Alien).is_empty());
    }

    #[test]
    fn test_advance_after_boss_finishes() {
        let mut registry = EntityRegistry::new();
        let mut director = director_at(4, &mut registry);
        director.advance(&mut registry);

        assert_eq!(director.advance(&mut registry), Progress::Finished);
        assert_eq!(director.index(), 4);
        assert_eq!(director.quota(), 0);
    }

    #[test]
    fn test_waves_fit_inside_world() {
        for wave in default_waves() {
            let mut registry = EntityRegistry::new();
            wave.spawn(&mut registry);
            for entity in registry.iter() {
                assert!(entity.x >= 0.0);
                assert!(entity.x + entity.width <= WORLD_WIDTH);
            }
        }
    }
}
