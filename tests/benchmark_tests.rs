//! Performance benchmarks for critical game systems

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::collision::{self, CollisionEvent, CollisionSink};
use server::factory;
use server::game::{Command, GameState};
use server::persistence::MemoryStore;
use server::registry::EntityRegistry;
use shared::{
    check_collision, decode_payload, encode_frame, Bounds, EntityKind, EntityView, GameStatus,
    Packet, PlayerAction, WORLD_WIDTH,
};
use std::sync::Arc;
use std::time::Instant;

/// Sink that only counts intents.
struct CountingSink {
    registry: EntityRegistry,
    events: usize,
}

impl CollisionSink for CountingSink {
    fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    fn apply(&mut self, _event: CollisionEvent) {
        self.events += 1;
    }
}

/// Benchmarks collision detection performance
#[test]
fn benchmark_collision_detection() {
    let a = Bounds::new(100.0, 100.0, 40.0, 30.0);
    let b = Bounds::new(110.0, 110.0, 6.0, 16.0);

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = check_collision(&a, &b);
    }

    let duration = start.elapsed();
    println!(
        "Collision detection: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 100);
}

/// Benchmarks one full pairwise pass over a crowded world
#[test]
fn benchmark_collision_pass() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut registry = EntityRegistry::new();
    for _ in 0..100 {
        let x = rng.gen_range(0.0..WORLD_WIDTH - 40.0);
        let y = rng.gen_range(0.0..400.0);
        factory::alien(&mut registry, x, y, 200, 0.0, 0.0);
    }
    for _ in 0..200 {
        let x = rng.gen_range(0.0..WORLD_WIDTH);
        let y = rng.gen_range(16.0..600.0);
        factory::shot(&mut registry, x, y, 1, 0);
    }

    let mut sink = CountingSink {
        registry,
        events: 0,
    };

    let passes = 10;
    let start = Instant::now();
    let mut contacts = 0;
    for _ in 0..passes {
        contacts += collision::resolve(&mut sink);
    }
    let duration = start.elapsed();

    println!(
        "Collision pass over 300 entities: {} passes in {:?} ({} contacts, {} intents)",
        passes, duration, contacts, sink.events
    );

    assert!(duration.as_millis() < 2_000);
}

/// Benchmarks whole simulation ticks with a full wave and two players
#[test]
fn benchmark_game_tick() {
    let mut game = GameState::with_rng(Arc::new(MemoryStore::new()), 120, StdRng::seed_from_u64(5));
    for session in 1..=2 {
        game.queue_command(Command::Join {
            session,
            username: None,
        });
    }

    let ticks = 1_200;
    let start = Instant::now();

    for tick in 0..ticks {
        let action = if tick % 2 == 0 {
            PlayerAction::Fire
        } else if tick % 240 < 120 {
            PlayerAction::MoveLeft
        } else {
            PlayerAction::MoveRight
        };
        game.queue_command(Command::Input { session: 1, action });
        game.tick();
        let _ = game.snapshot().packet_for(1);
    }

    let duration = start.elapsed();
    let per_tick = duration.as_secs_f64() / ticks as f64;
    println!(
        "Game tick: {} ticks in {:?} ({:.2} μs/tick)",
        ticks,
        duration,
        per_tick * 1_000_000.0
    );

    // One tick has to fit comfortably inside a 120 Hz frame
    assert!(per_tick < 1.0 / 120.0);
}

/// Benchmarks snapshot frame encoding and decoding
#[test]
fn benchmark_snapshot_encoding() {
    let entities: Vec<EntityView> = (0..200)
        .map(|id| EntityView {
            id,
            kind: EntityKind::Alien,
            x: id as f32,
            y: 60.0,
            width: 40.0,
            height: 30.0,
            hp: Some(200),
            frame: None,
        })
        .collect();
    let packet = Packet::GameState {
        tick: 1,
        entities,
        score: 10,
        lives: 3,
        status: GameStatus::Playing,
    };

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let frame = encode_frame(&packet).unwrap();
        let decoded = decode_payload(&frame[4..]).unwrap();
        assert!(matches!(decoded, Packet::GameState { .. }));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encode/decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2_000);
}
