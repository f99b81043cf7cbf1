//! Participants: a name, a hidden placement and what they have learned
//! about the opponent.

use shared::{Cell, Mark, ObservationGrid, Placement, PlacementError};
use thiserror::Error;

/// Reasons a registration is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("player name must not be empty")]
    EmptyName,
    #[error("a player named {0:?} is already seated")]
    DuplicateName(String),
    #[error("invalid placement: {0}")]
    Placement(#[from] PlacementError),
}

/// One competitor in a match
#[derive(Debug, Clone)]
pub struct Participant {
    name: String,
    placement: Placement,
    observations: ObservationGrid,
}

impl Participant {
    /// Validates a name and raw placement into a participant
    ///
    /// Nothing outside the returned value is touched, so a failed
    /// registration leaves every session untouched.
    pub fn register(name: impl Into<String>, cells: &[i64]) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let placement = Placement::new(cells)?;

        Ok(Self {
            name,
            placement,
            observations: ObservationGrid::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn observations(&self) -> &ObservationGrid {
        &self.observations
    }

    /// Number of opposing cells this participant has found
    pub fn hit_count(&self) -> usize {
        self.observations.hit_count()
    }
}

/// Fires `attacker` at `cell` on `defender`'s board
///
/// The outcome is written into the attacker's observation grid; the defender
/// is never modified.
pub fn resolve_attack(attacker: &mut Participant, defender: &Participant, cell: Cell) -> Mark {
    let mark = defender.placement.mark_for(cell);
    attacker.observations.record(cell, mark);
    mark
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::FLEET_SIZE;

    fn cells(range: std::ops::Range<i64>) -> Vec<i64> {
        range.collect()
    }

    #[test]
    fn test_register_valid() {
        let player = Participant::register("alice", &cells(0..16)).unwrap();
        assert_eq!(player.name(), "alice");
        assert_eq!(player.placement().len(), FLEET_SIZE);
        assert_eq!(player.hit_count(), 0);
    }

    #[test]
    fn test_register_rejects_empty_name() {
        assert_eq!(
            Participant::register("  ", &cells(0..16)).unwrap_err(),
            ValidationError::EmptyName
        );
    }

    #[test]
    fn test_register_rejects_bad_placement() {
        let err = Participant::register("alice", &cells(0..10)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Placement(PlacementError::WrongSize { .. })
        ));
    }

    #[test]
    fn test_resolve_attack_updates_attacker_only() {
        let mut alice = Participant::register("alice", &cells(0..16)).unwrap();
        let bob = Participant::register("bob", &cells(16..32)).unwrap();

        let hit = resolve_attack(&mut alice, &bob, Cell::new(16).unwrap());
        let miss = resolve_attack(&mut alice, &bob, Cell::new(0).unwrap());

        assert_eq!(hit, Mark::Hit);
        assert_eq!(miss, Mark::Miss);
        assert_eq!(alice.observations().get(Cell::new(16).unwrap()), Mark::Hit);
        assert_eq!(alice.observations().get(Cell::new(0).unwrap()), Mark::Miss);
        assert_eq!(alice.hit_count(), 1);
        assert_eq!(bob.hit_count(), 0);
        assert_eq!(bob.observations(), &ObservationGrid::new());
    }

    #[test]
    fn test_repeat_hit_does_not_inflate_count() {
        let mut alice = Participant::register("alice", &cells(0..16)).unwrap();
        let bob = Participant::register("bob", &cells(16..32)).unwrap();

        for _ in 0..3 {
            resolve_attack(&mut alice, &bob, Cell::new(20).unwrap());
        }
        assert_eq!(alice.hit_count(), 1);
    }
}
