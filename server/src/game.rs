//! The authoritative simulation.
//!
//! [`GameState`] owns every entity and every per-session player record and is
//! only ever touched by the server's game loop task. Inputs arrive as
//! [`Command`]s queued between ticks and are applied at the start of the next
//! [`GameState::tick`], so a tick never observes a half-applied input.
//!
//! One tick runs in this order:
//!
//! 1. queued commands
//! 2. per-entity movement and behaviour, collecting deferred effects
//! 3. laser tracking
//! 4. meteor spawning
//! 5. deferred effects (formation reversal, new shots)
//! 6. pairwise collision resolution
//! 7. boss patterns and stage progression
//! 8. removal flush

use crate::boss::{self, BossEvent, BOSS_KILL_BONUS};
use crate::collision::{self, CollisionEvent, CollisionSink};
use crate::entity::*;
use crate::factory;
use crate::persistence::PersistenceGateway;
use crate::registry::EntityRegistry;
use crate::stage::{
    Progress, StageDirector, Wave, ITEM_DROP_CHANCE, METEOR_CHANCE, SPEED_SCALE_PER_KILL,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    EntityKind, EntityView, GameStatus, Packet, PlayerAction, STARTING_LIVES, WORLD_HEIGHT,
    WORLD_WIDTH,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Distance from the world edge at which a patrolling formation turns.
pub const EDGE_MARGIN: f32 = 10.0;
/// How far the formation drops each time it turns.
pub const FORMATION_DROP: f32 = 10.0;
/// Lowest line the bottom of the formation may reach, just above the ships.
pub const FORMATION_FLOOR: f32 = PLAYER_SPAWN.1 - 40.0;

/// Per-session record. The ship entity refers back to its session by id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    /// `None` for guests, whose scores are never persisted.
    pub username: Option<String>,
    pub score: u64,
    pub lives: u32,
    pub entity: Option<u32>,
    /// Simulation time at which the last stun started.
    pub stunned_at: Option<f32>,
    pub score_persisted: bool,
}

impl PlayerData {
    pub fn new(username: Option<String>) -> Self {
        Self {
            username,
            score: 0,
            lives: STARTING_LIVES,
            entity: None,
            stunned_at: None,
            score_persisted: false,
        }
    }

    pub fn is_stunned(&self, now: f32) -> bool {
        self.stunned_at
            .map_or(false, |started| now - started < STUN_DURATION)
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("guest")
    }
}

/// Requests from the network side, applied at the start of the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Binds a ship to the session. Ignored once the session has played.
    Join {
        session: u32,
        username: Option<String>,
    },
    /// Attaches an account name to an existing session.
    Rename { session: u32, username: String },
    Input { session: u32, action: PlayerAction },
    Leave { session: u32 },
}

/// Work discovered while entities move, applied in one batch before
/// collision resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Deferred {
    ReverseFormation,
    PlayerShot {
        owner: u32,
        center_x: f32,
        y: f32,
        upgrade_level: u32,
    },
    AlienShot {
        center_x: f32,
        y: f32,
    },
}

/// What one tick did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub contacts: usize,
    pub removed: Vec<u32>,
}

pub struct GameState {
    pub tick: u64,
    /// Simulation seconds elapsed.
    pub time: f32,
    pub registry: EntityRegistry,
    pub players: BTreeMap<u32, PlayerData>,
    pub stage: StageDirector,
    /// Set once the boss falls or the last stage is passed. The world
    /// freezes from then on.
    pub won: bool,
    dt: f32,
    inbox: Vec<Command>,
    deferred: Vec<Deferred>,
    advance_requested: bool,
    rng: StdRng,
    store: Arc<dyn PersistenceGateway>,
}

impl GameState {
    pub fn new(store: Arc<dyn PersistenceGateway>, tick_rate: u32) -> Self {
        Self::with_rng(store, tick_rate, StdRng::from_entropy())
    }

    /// Starts the default wave list with a caller-supplied random source.
    pub fn with_rng(store: Arc<dyn PersistenceGateway>, tick_rate: u32, rng: StdRng) -> Self {
        Self::with_waves(store, tick_rate, rng, crate::stage::default_waves())
    }

    pub fn with_waves(
        store: Arc<dyn PersistenceGateway>,
        tick_rate: u32,
        rng: StdRng,
        waves: Vec<Wave>,
    ) -> Self {
        let mut registry = EntityRegistry::new();
        let mut stage = StageDirector::new(waves);
        stage.start(&mut registry);

        Self {
            tick: 0,
            time: 0.0,
            registry,
            players: BTreeMap::new(),
            stage,
            won: false,
            dt: 1.0 / tick_rate.max(1) as f32,
            inbox: Vec::new(),
            deferred: Vec::new(),
            advance_requested: false,
            rng,
            store,
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn queue_command(&mut self, command: Command) {
        self.inbox.push(command);
    }

    pub fn player(&self, session: u32) -> Option<&PlayerData> {
        self.players.get(&session)
    }

    /// Whether the session currently steers a ship.
    pub fn is_bound(&self, session: u32) -> bool {
        self.players
            .get(&session)
            .map_or(false, |player| player.entity.is_some())
    }

    /// Runs one fixed step of the simulation.
    pub fn tick(&mut self) -> TickReport {
        self.apply_commands();

        if self.won {
            self.tick += 1;
            return TickReport {
                contacts: 0,
                removed: self.registry.flush_removals(),
            };
        }

        self.time += self.dt;
        self.step_entities();
        self.track_lasers();
        self.spawn_meteor();
        self.apply_deferred();
        let contacts = collision::resolve(self);
        self.run_bookkeeping();
        let removed = self.registry.flush_removals();

        self.tick += 1;
        TickReport { contacts, removed }
    }

    /// Detached copy of the world for the network layer.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            entities: self.registry.snapshot(),
            players: self
                .players
                .iter()
                .map(|(&session, player)| (session, (player.score, player.lives)))
                .collect(),
            won: self.won,
        }
    }

    fn apply_commands(&mut self) {
        for command in std::mem::take(&mut self.inbox) {
            match command {
                Command::Join { session, username } => self.join(session, username),
                Command::Rename { session, username } => {
                    if let Some(player) = self.players.get_mut(&session) {
                        player.username = Some(username);
                    }
                }
                Command::Input { session, action } => self.apply_input(session, action),
                Command::Leave { session } => {
                    if let Some(player) = self.players.remove(&session) {
                        if let Some(entity) = player.entity {
                            self.registry.mark_for_removal(entity);
                        }
                        info!("Session {} left the game", session);
                    }
                }
            }
        }
    }

    fn join(&mut self, session: u32, username: Option<String>) {
        let player = self
            .players
            .entry(session)
            .or_insert_with(|| PlayerData::new(username.clone()));
        if player.entity.is_some() || player.lives == 0 {
            return;
        }
        if player.username.is_none() {
            player.username = username;
        }

        let entity = factory::player(&mut self.registry, session);
        player.entity = Some(entity);
        info!(
            "Session {} ({}) joined with ship {}",
            session,
            player.display_name(),
            entity
        );
    }

    fn apply_input(&mut self, session: u32, action: PlayerAction) {
        let Some(player) = self.players.get(&session) else {
            return;
        };
        let Some(entity_id) = player.entity else {
            return;
        };

        if action == PlayerAction::SkipStage {
            info!("Session {} skipped stage {}", session, self.stage.index());
            self.advance_requested = true;
            return;
        }

        if player.is_stunned(self.time) {
            debug!("Ignoring {:?} from stunned session {}", action, session);
            return;
        }

        let Some(ship) = self.registry.get_mut(entity_id) else {
            return;
        };
        match action {
            PlayerAction::MoveLeft => ship.dx = -PLAYER_SPEED,
            PlayerAction::MoveRight => ship.dx = PLAYER_SPEED,
            PlayerAction::Stop => ship.dx = 0.0,
            PlayerAction::Fire => {
                if let Some(state) = ship.ship_mut() {
                    state.fire_requested = true;
                }
            }
            PlayerAction::SkipStage => {}
        }
    }

    fn step_entities(&mut self) {
        let dt = self.dt;

        for boss_id in self.registry.live_ids_of(EntityKind::Boss) {
            boss::patrol(&mut self.registry, boss_id);
        }

        for id in self.registry.ids() {
            if self.registry.is_pending_removal(id) {
                continue;
            }
            let Some(entity) = self.registry.get_mut(id) else {
                continue;
            };
            entity.integrate(dt);

            let mut expired = false;
            match &mut entity.state {
                EntityState::Player(ship) => {
                    entity.x = entity.x.clamp(0.0, WORLD_WIDTH - entity.width);
                    ship.grace = (ship.grace - dt).max(0.0);
                    ship.fire_cooldown = (ship.fire_cooldown - dt).max(0.0);
                    if std::mem::take(&mut ship.fire_requested) && ship.fire_cooldown <= 0.0 {
                        ship.fire_cooldown = FIRE_COOLDOWN;
                        self.deferred.push(Deferred::PlayerShot {
                            owner: ship.owner,
                            center_x: entity.x + entity.width / 2.0,
                            y: entity.y,
                            upgrade_level: ship.upgrade_level,
                        });
                    }
                }
                EntityState::Alien { fire_chance } => {
                    if self.rng.gen_bool(fire_chance.clamp(0.0, 1.0)) {
                        self.deferred.push(Deferred::AlienShot {
                            center_x: entity.x + entity.width / 2.0,
                            y: entity.y + entity.height,
                        });
                    }
                    if at_turning_edge(entity) {
                        self.deferred.push(Deferred::ReverseFormation);
                    }
                }
                EntityState::ReflectAlien => {
                    if at_turning_edge(entity) {
                        self.deferred.push(Deferred::ReverseFormation);
                    }
                }
                EntityState::Shot { .. } => expired = entity.y + entity.height < 0.0,
                EntityState::AlienShot => {
                    expired = entity.y > WORLD_HEIGHT
                        || entity.x + entity.width < 0.0
                        || entity.x > WORLD_WIDTH
                }
                EntityState::Item => expired = entity.y > ITEM_DESPAWN_Y,
                EntityState::Meteor { frame, frame_time } => {
                    *frame_time += dt;
                    while *frame_time >= METEOR_FRAME_TIME {
                        *frame_time -= METEOR_FRAME_TIME;
                        *frame = (*frame + 1) % METEOR_FRAMES;
                    }
                    expired = entity.y > METEOR_DESPAWN_Y;
                }
                EntityState::Boss(_) | EntityState::Laser { .. } => {}
            }

            if expired {
                self.registry.mark_for_removal(id);
            }
        }
    }

    /// Keeps each laser glued under its boss. A laser whose boss is gone or
    /// whose time ran out removes itself.
    fn track_lasers(&mut self) {
        for id in self.registry.live_ids_of(EntityKind::Laser) {
            let Some(laser) = self.registry.get_mut(id) else {
                continue;
            };
            let EntityState::Laser { boss, remaining } = &mut laser.state else {
                continue;
            };
            *remaining -= self.dt;
            let (boss_id, expired) = (*boss, *remaining <= 0.0);

            let anchor = match self.registry.get(boss_id) {
                Some(boss) if !expired && self.registry.is_live(boss_id) => {
                    Some((boss.x + boss.width / 2.0, boss.y + boss.height))
                }
                _ => None,
            };

            match anchor {
                Some((center_x, bottom)) => {
                    if let Some(laser) = self.registry.get_mut(id) {
                        laser.x = center_x - laser.width / 2.0;
                        laser.y = bottom;
                        laser.height = (WORLD_HEIGHT - bottom).max(0.0);
                    }
                }
                None => self.registry.mark_for_removal(id),
            }
        }
    }

    fn spawn_meteor(&mut self) {
        if !self.stage.meteors_enabled() || !self.rng.gen_bool(METEOR_CHANCE) {
            return;
        }
        let x = self.rng.gen_range(0.0..WORLD_WIDTH - METEOR_SIZE);
        let id = factory::meteor(&mut self.registry, x);
        debug!("Meteor {} spawned at x={:.0}", id, x);
    }

    fn apply_deferred(&mut self) {
        let mut reversed = false;
        for effect in std::mem::take(&mut self.deferred) {
            match effect {
                Deferred::ReverseFormation => {
                    if !reversed {
                        reversed = true;
                        self.reverse_formation();
                    }
                }
                Deferred::PlayerShot {
                    owner,
                    center_x,
                    y,
                    upgrade_level,
                } => {
                    factory::shot(&mut self.registry, center_x, y, owner, upgrade_level);
                }
                Deferred::AlienShot { center_x, y } => {
                    factory::alien_shot(&mut self.registry, center_x, y, 0.0);
                }
            }
        }
    }

    /// Turns every patrolling alien around and drops the formation, never
    /// past [`FORMATION_FLOOR`].
    fn reverse_formation(&mut self) {
        let patrol: Vec<u32> = self
            .registry
            .ids()
            .into_iter()
            .filter(|&id| {
                self.registry.is_live(id)
                    && self.registry.get(id).map_or(false, |e| e.kind().is_patrol())
            })
            .collect();

        let lowest = patrol
            .iter()
            .filter_map(|&id| self.registry.get(id))
            .map(|e| e.y + e.height)
            .fold(f32::MIN, f32::max);
        let drop = (FORMATION_FLOOR - lowest).clamp(0.0, FORMATION_DROP);

        for id in patrol {
            if let Some(entity) = self.registry.get_mut(id) {
                entity.dx = -entity.dx;
                entity.y += drop;
            }
        }
    }

    fn run_bookkeeping(&mut self) {
        for boss_id in self.registry.live_ids_of(EntityKind::Boss) {
            if let Some(BossEvent::Summoned(count)) =
                boss::step(&mut self.registry, boss_id, self.dt, &mut self.rng)
            {
                self.stage.add_quota(count);
            }
        }

        if std::mem::take(&mut self.advance_requested) && !self.won {
            if let Progress::Finished = self.stage.advance(&mut self.registry) {
                info!("Every stage cleared without a boss kill");
                self.persist_all();
                self.won = true;
            }
        }
    }

    fn damage(&mut self, target: u32, amount: i32, attacker: u32) {
        let Some(entity) = self.registry.get_mut(target) else {
            return;
        };
        let Some(hp) = entity.hp.as_mut() else {
            return;
        };
        *hp -= amount;
        if *hp > 0 {
            return;
        }

        let kind = entity.kind();
        let (center_x, center_y) = entity.bounds().center();
        match kind {
            EntityKind::Alien => self.alien_killed(target, attacker, center_x, center_y),
            EntityKind::Boss => self.boss_defeated(target, attacker),
            _ => self.registry.mark_for_removal(target),
        }
    }

    fn alien_killed(&mut self, alien: u32, attacker: u32, center_x: f32, center_y: f32) {
        self.registry.mark_for_removal(alien);
        if let Some(player) = self.players.get_mut(&attacker) {
            player.score += 1;
        }

        for id in self.registry.ids() {
            if !self.registry.is_live(id) {
                continue;
            }
            if let Some(entity) = self.registry.get_mut(id) {
                if entity.kind().is_patrol() {
                    entity.dx *= SPEED_SCALE_PER_KILL;
                }
            }
        }

        if self.rng.gen_bool(ITEM_DROP_CHANCE) {
            factory::item(
                &mut self.registry,
                center_x - ITEM_SIZE / 2.0,
                center_y - ITEM_SIZE / 2.0,
            );
        }

        if self.stage.record_kill() {
            self.advance_requested = true;
        }
    }

    fn boss_defeated(&mut self, boss_id: u32, attacker: u32) {
        if self.won {
            return;
        }
        self.registry.mark_for_removal(boss_id);
        for laser in self.registry.live_ids_of(EntityKind::Laser) {
            let owned = matches!(
                self.registry.get(laser).map(|e| &e.state),
                Some(EntityState::Laser { boss, .. }) if *boss == boss_id
            );
            if owned {
                self.registry.mark_for_removal(laser);
            }
        }

        if let Some(player) = self.players.get_mut(&attacker) {
            player.score += BOSS_KILL_BONUS;
            info!("{} defeated the boss", player.display_name());
        }
        self.persist_all();
        self.won = true;
    }

    fn player_hit(&mut self, entity_id: u32) {
        let Some(ship) = self.registry.get(entity_id).and_then(Entity::ship) else {
            return;
        };
        if ship.grace > 0.0 {
            return;
        }
        let owner = ship.owner;

        let Some(player) = self.players.get_mut(&owner) else {
            self.registry.mark_for_removal(entity_id);
            return;
        };
        player.lives = player.lives.saturating_sub(1);

        if player.lives > 0 {
            info!(
                "{} was hit, {} lives left",
                player.display_name(),
                player.lives
            );
            if let Some(entity) = self.registry.get_mut(entity_id) {
                (entity.x, entity.y) = PLAYER_SPAWN;
                entity.dx = 0.0;
                if let Some(ship) = entity.ship_mut() {
                    ship.grace = RESPAWN_GRACE;
                    ship.fire_cooldown = 0.0;
                    ship.fire_requested = false;
                }
            }
            return;
        }

        info!("{} is out of lives", player.display_name());
        player.entity = None;
        self.registry.mark_for_removal(entity_id);
        self.persist_score(owner);
    }

    fn stun(&mut self, entity_id: u32) {
        let Some(entity) = self.registry.get_mut(entity_id) else {
            return;
        };
        let Some(owner) = entity.ship().map(|ship| ship.owner) else {
            return;
        };
        entity.dx = 0.0;
        if let Some(player) = self.players.get_mut(&owner) {
            player.stunned_at = Some(self.time);
            debug!("{} stunned", player.display_name());
        }
    }

    fn upgrade(&mut self, entity_id: u32) {
        if let Some(ship) = self.registry.get_mut(entity_id).and_then(Entity::ship_mut) {
            ship.upgrade_level = (ship.upgrade_level + 1).min(MAX_UPGRADE);
        }
    }

    /// Writes the session's score once. Guests and repeat calls are no-ops.
    fn persist_score(&mut self, session: u32) {
        let Some(player) = self.players.get_mut(&session) else {
            return;
        };
        if player.score_persisted {
            return;
        }
        player.score_persisted = true;

        let Some(username) = player.username.as_deref() else {
            debug!("Not persisting guest score {}", player.score);
            return;
        };
        match self.store.insert_score(username, player.score) {
            Ok(()) => info!("Saved score {} for {}", player.score, username),
            Err(e) => warn!("Failed to save score for {}: {}", username, e),
        }
    }

    fn persist_all(&mut self) {
        let sessions: Vec<u32> = self.players.keys().copied().collect();
        for session in sessions {
            self.persist_score(session);
        }
    }
}

impl CollisionSink for GameState {
    fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    fn apply(&mut self, event: CollisionEvent) {
        match event {
            CollisionEvent::Remove(id) => self.registry.mark_for_removal(id),
            CollisionEvent::Damage {
                target,
                amount,
                attacker,
            } => self.damage(target, amount, attacker),
            CollisionEvent::PlayerHit(id) => self.player_hit(id),
            CollisionEvent::Stun(id) => self.stun(id),
            CollisionEvent::Upgrade(id) => self.upgrade(id),
            CollisionEvent::Reflect { x, y } => {
                factory::alien_shot(&mut self.registry, x, y, 0.0);
            }
        }
    }
}

fn at_turning_edge(entity: &Entity) -> bool {
    (entity.x <= EDGE_MARGIN && entity.dx < 0.0)
        || (entity.x + entity.width >= WORLD_WIDTH - EDGE_MARGIN && entity.dx > 0.0)
}

/// Owned copy of the world after a tick, detached from the simulation so it
/// can be fanned out to sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub entities: Vec<EntityView>,
    /// Session id to (score, lives).
    pub players: BTreeMap<u32, (u64, u32)>,
    pub won: bool,
}

impl WorldSnapshot {
    pub fn status_for(&self, session: u32) -> GameStatus {
        if self.won {
            return GameStatus::StageClear;
        }
        match self.players.get(&session) {
            Some(&(_, 0)) => GameStatus::GameOver,
            _ => GameStatus::Playing,
        }
    }

    /// The state packet as seen by one session. Sessions without a ship
    /// see the world with zero score and lives.
    pub fn packet_for(&self, session: u32) -> Packet {
        let (score, lives) = self.players.get(&session).copied().unwrap_or((0, 0));
        Packet::GameState {
            tick: self.tick,
            entities: self.entities.clone(),
            score,
            lives,
            status: self.status_for(session),
        }
    }
}
