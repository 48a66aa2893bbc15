//! Explicit diff objects over the world arena
//!
//! Every mutation a trial makes is a `Change`. Each variant carries enough
//! data to build its exact inverse, so reverting a trial is mechanical:
//! apply `journal.invert()` and the state is back where it started.

use crate::core::error::Result;
use crate::core::types::{TerritoryId, UnitId};
use crate::world::state::WorldState;
use crate::world::unit::Unit;

/// A reversible mutation of a `WorldState`
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert unit records into the arena (not into any territory)
    CreateUnits(Vec<Unit>),
    /// Remove unit records from the arena
    DestroyUnits(Vec<Unit>),
    /// Put existing units into a territory
    PlaceUnits {
        territory: TerritoryId,
        units: Vec<UnitId>,
    },
    /// Take units out of a territory (they stay in the arena)
    RemoveUnits {
        territory: TerritoryId,
        units: Vec<UnitId>,
    },
    /// Damage counter of one unit goes from `from` to `to`
    UnitHits { unit: UnitId, from: u8, to: u8 },
    /// Ordered sequence of changes
    Composite(Vec<Change>),
}

impl Change {
    pub fn place(territory: TerritoryId, units: impl IntoIterator<Item = UnitId>) -> Self {
        Change::PlaceUnits {
            territory,
            units: units.into_iter().collect(),
        }
    }

    pub fn remove(territory: TerritoryId, units: impl IntoIterator<Item = UnitId>) -> Self {
        Change::RemoveUnits {
            territory,
            units: units.into_iter().collect(),
        }
    }

    /// The change that exactly undoes this one
    pub fn invert(&self) -> Change {
        match self {
            Change::CreateUnits(units) => Change::DestroyUnits(units.iter().rev().copied().collect()),
            Change::DestroyUnits(units) => Change::CreateUnits(units.iter().rev().copied().collect()),
            Change::PlaceUnits { territory, units } => Change::RemoveUnits {
                territory: *territory,
                units: units.iter().rev().copied().collect(),
            },
            Change::RemoveUnits { territory, units } => Change::PlaceUnits {
                territory: *territory,
                units: units.iter().rev().copied().collect(),
            },
            Change::UnitHits { unit, from, to } => Change::UnitHits {
                unit: *unit,
                from: *to,
                to: *from,
            },
            Change::Composite(changes) => {
                Change::Composite(changes.iter().rev().map(Change::invert).collect())
            }
        }
    }

    /// True when applying this change would do nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Change::CreateUnits(units) | Change::DestroyUnits(units) => units.is_empty(),
            Change::PlaceUnits { units, .. } | Change::RemoveUnits { units, .. } => units.is_empty(),
            Change::UnitHits { from, to, .. } => from == to,
            Change::Composite(changes) => changes.iter().all(Change::is_empty),
        }
    }

    /// Apply the change; either all of it takes effect or none of it does
    pub fn apply(&self, state: &mut WorldState) -> Result<()> {
        let mut steps = Vec::new();
        self.flatten(&mut steps);

        for (done, step) in steps.iter().enumerate() {
            if let Err(err) = step.apply(state) {
                for applied in steps[..done].iter().rev() {
                    if let Err(undo_err) = applied.undo(state) {
                        tracing::error!("Failed to roll back partial change: {}", undo_err);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn flatten(&self, steps: &mut Vec<Step>) {
        match self {
            Change::CreateUnits(units) => steps.extend(units.iter().map(|u| Step::Insert(*u))),
            Change::DestroyUnits(units) => steps.extend(units.iter().map(|u| Step::Delete(*u))),
            Change::PlaceUnits { territory, units } => {
                steps.extend(units.iter().map(|u| Step::Place(*territory, *u)))
            }
            Change::RemoveUnits { territory, units } => {
                steps.extend(units.iter().map(|u| Step::Displace(*territory, *u)))
            }
            Change::UnitHits { unit, from, to } => steps.push(Step::Hits(*unit, *from, *to)),
            Change::Composite(changes) => {
                for change in changes {
                    change.flatten(steps);
                }
            }
        }
    }
}

/// Single-unit primitive a change decomposes into
#[derive(Debug, Clone, Copy)]
enum Step {
    Insert(Unit),
    Delete(Unit),
    Place(TerritoryId, UnitId),
    Displace(TerritoryId, UnitId),
    Hits(UnitId, u8, u8),
}

impl Step {
    fn apply(&self, state: &mut WorldState) -> Result<()> {
        match *self {
            Step::Insert(unit) => state.insert_unit(unit),
            Step::Delete(unit) => state.remove_unit(&unit),
            Step::Place(territory, unit) => state.place(territory, unit),
            Step::Displace(territory, unit) => state.displace(territory, unit),
            Step::Hits(unit, from, to) => state.set_hits(unit, from, to),
        }
    }

    fn undo(&self, state: &mut WorldState) -> Result<()> {
        match *self {
            Step::Insert(unit) => state.remove_unit(&unit),
            Step::Delete(unit) => state.insert_unit(unit),
            Step::Place(territory, unit) => state.displace(territory, unit),
            Step::Displace(territory, unit) => state.place(territory, unit),
            Step::Hits(unit, from, to) => state.set_hits(unit, to, from),
        }
    }
}

/// Record of every change applied to a state, in order
#[derive(Debug, Clone, Default)]
pub struct ChangeJournal {
    changes: Vec<Change>,
}

impl ChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change and remember it; failed changes are not recorded
    pub fn record(&mut self, state: &mut WorldState, change: Change) -> Result<()> {
        if change.is_empty() {
            return Ok(());
        }
        change.apply(state)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Undo everything recorded so far, newest first
    pub fn revert(&mut self, state: &mut WorldState) -> Result<()> {
        let recorded = Change::Composite(std::mem::take(&mut self.changes));
        recorded.invert().apply(state)
    }

    pub fn into_change(self) -> Change {
        Change::Composite(self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PlayerId, UnitTypeId};
    use crate::world::state::Territory;
    use crate::world::unit::{Domain, UnitType};

    fn world_with_unit() -> (WorldState, Unit) {
        let mut world = WorldState::new(6);
        world.add_player(PlayerId(1), "Blue");
        world.add_unit_type(
            UnitType::new(UnitTypeId(1), "battleship", Domain::Sea)
                .with_combat(4, 4)
                .with_hit_points(2),
        );
        world.add_territory(Territory::sea(TerritoryId(1), "North Sea"));
        world.add_territory(Territory::sea(TerritoryId(2), "Baltic"));
        let unit = world
            .spawn_unit(TerritoryId(1), UnitTypeId(1), PlayerId(1))
            .expect("spawn should succeed");
        (world, unit)
    }

    #[test]
    fn test_invert_of_invert_is_identity() {
        let change = Change::Composite(vec![
            Change::remove(TerritoryId(1), [UnitId(1), UnitId(2)]),
            Change::UnitHits {
                unit: UnitId(1),
                from: 0,
                to: 1,
            },
        ]);
        assert_eq!(change.invert().invert(), change);
    }

    #[test]
    fn test_journal_revert_restores_state() {
        let (mut world, unit) = world_with_unit();
        let before = world.clone();

        let mut journal = ChangeJournal::new();
        journal
            .record(&mut world, Change::remove(TerritoryId(1), [unit.id]))
            .expect("remove should apply");
        journal
            .record(&mut world, Change::place(TerritoryId(2), [unit.id]))
            .expect("place should apply");
        journal
            .record(
                &mut world,
                Change::UnitHits {
                    unit: unit.id,
                    from: 0,
                    to: 1,
                },
            )
            .expect("hits should apply");
        assert_ne!(world, before);

        journal.revert(&mut world).expect("revert should apply");
        assert_eq!(world, before);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_failed_change_rolls_back_prefix() {
        let (mut world, unit) = world_with_unit();
        let before = world.clone();

        // Second step fails: the unit is not in the Baltic
        let change = Change::Composite(vec![
            Change::place(TerritoryId(2), [unit.id]),
            Change::remove(TerritoryId(2), [unit.id, unit.id]),
        ]);
        assert!(change.apply(&mut world).is_err());
        assert_eq!(world, before);
    }

    #[test]
    fn test_create_and_destroy_units() {
        let (mut world, _) = world_with_unit();
        let fresh = Unit::new(UnitId(50), UnitTypeId(1), PlayerId(1));
        let create = Change::CreateUnits(vec![fresh]);

        create.apply(&mut world).expect("create should apply");
        assert!(world.contains_unit(UnitId(50)));
        create.invert().apply(&mut world).expect("destroy should apply");
        assert!(!world.contains_unit(UnitId(50)));
    }

    #[test]
    fn test_empty_changes_not_recorded() {
        let (mut world, _) = world_with_unit();
        let mut journal = ChangeJournal::new();
        journal
            .record(&mut world, Change::place(TerritoryId(1), []))
            .expect("empty change is a no-op");
        assert!(journal.is_empty());
    }
}
