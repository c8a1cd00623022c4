//! Scripted pilot for driving a session without a human.
//!
//! Snapshots do not say which ship belongs to whom, so the autopilot claims
//! the newest player ship the first time it sees itself alive. A ship that
//! just spawned always has the highest id.

use shared::{EntityKind, EntityView, PlayerAction};

/// Horizontal slack, in world units, within which the ship counts as lined up.
pub const ALIGN_TOLERANCE: f32 = 8.0;
/// Snapshots to wait between fire requests.
pub const FIRE_INTERVAL: u32 = 30;

#[derive(Debug)]
pub struct Autopilot {
    ship: Option<u32>,
    heading: Option<PlayerAction>,
    since_fire: u32,
}

impl Autopilot {
    pub fn new() -> Self {
        Self {
            ship: None,
            heading: None,
            since_fire: FIRE_INTERVAL,
        }
    }

    /// Id of the ship being flown, once claimed.
    pub fn ship(&self) -> Option<u32> {
        self.ship
    }

    /// Actions to send in response to one snapshot. Movement is only sent
    /// when it changes.
    pub fn decide(&mut self, entities: &[EntityView]) -> Vec<PlayerAction> {
        let Some(ship) = self.locate_ship(entities) else {
            return Vec::new();
        };
        let ship_x = ship.bounds().center().0;
        self.since_fire = self.since_fire.saturating_add(1);

        let target = entities
            .iter()
            .filter(|e| matches!(e.kind, EntityKind::Alien | EntityKind::Boss))
            .map(|e| e.bounds().center().0)
            .min_by(|a, b| (a - ship_x).abs().total_cmp(&(b - ship_x).abs()));

        let mut actions = Vec::new();
        let wanted = match target {
            Some(x) if x < ship_x - ALIGN_TOLERANCE => PlayerAction::MoveLeft,
            Some(x) if x > ship_x + ALIGN_TOLERANCE => PlayerAction::MoveRight,
            _ => PlayerAction::Stop,
        };
        if self.heading != Some(wanted) {
            self.heading = Some(wanted);
            actions.push(wanted);
        }

        if target.is_some() && self.since_fire >= FIRE_INTERVAL {
            self.since_fire = 0;
            actions.push(PlayerAction::Fire);
        }
        actions
    }

    fn locate_ship<'a>(&mut self, entities: &'a [EntityView]) -> Option<&'a EntityView> {
        let mut players = entities.iter().filter(|e| e.kind == EntityKind::Player);
        match self.ship {
            Some(id) => players.find(|e| e.id == id),
            None => {
                let newest = players.max_by_key(|e| e.id)?;
                self.ship = Some(newest.id);
                Some(newest)
            }
        }
    }
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u32, kind: EntityKind, x: f32) -> EntityView {
        EntityView {
            id,
            kind,
            x,
            y: 100.0,
            width: 40.0,
            height: 30.0,
            hp: None,
            frame: None,
        }
    }

    #[test]
    fn test_claims_newest_ship() {
        let mut pilot = Autopilot::new();
        let world = vec![
            view(3, EntityKind::Player, 100.0),
            view(9, EntityKind::Player, 500.0),
        ];

        pilot.decide(&world);
        assert_eq!(pilot.ship(), Some(9));
    }

    #[test]
    fn test_steers_toward_nearest_enemy_and_fires() {
        let mut pilot = Autopilot::new();
        let world = vec![
            view(1, EntityKind::Alien, 100.0),
            view(2, EntityKind::Alien, 600.0),
            view(5, EntityKind::Player, 450.0),
        ];

        let actions = pilot.decide(&world);
        assert_eq!(actions, vec![PlayerAction::MoveRight, PlayerAction::Fire]);

        let actions = pilot.decide(&world);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_stops_when_aligned_or_alone() {
        let mut pilot = Autopilot::new();
        let aligned = vec![
            view(1, EntityKind::Alien, 402.0),
            view(5, EntityKind::Player, 400.0),
        ];
        assert_eq!(
            pilot.decide(&aligned),
            vec![PlayerAction::Stop, PlayerAction::Fire]
        );

        let mut pilot = Autopilot::new();
        let alone = vec![view(5, EntityKind::Player, 400.0)];
        assert_eq!(pilot.decide(&alone), vec![PlayerAction::Stop]);
    }

    #[test]
    fn test_no_ship_no_actions() {
        let mut pilot = Autopilot::new();
        assert!(pilot.decide(&[view(1, EntityKind::Alien, 0.0)]).is_empty());
        assert_eq!(pilot.ship(), None);
    }
}
