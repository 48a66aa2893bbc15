//! Fixed casualty ordering ("order of losses") strings
//!
//! Format: sections separated by `;`, each `<amount>^<unit type name>`, where
//! the amount is a positive integer or `*` for every remaining unit of that
//! type. Earlier sections are taken as casualties first, but sections claim
//! their units from last to first. A later `*` section therefore takes every
//! unit of its type, and an earlier section of the same type gets nothing:
//! in `1^infantry;*^infantry` the `1^` section is empty. To put a single
//! infantry last, write `*^infantry;1^infantry`.

use crate::core::error::{OddsError, Result};
use crate::core::types::{UnitId, UnitTypeId};
use crate::world::state::WorldState;
use crate::world::unit::Unit;

pub const OOL_ALL: &str = "*";
pub const OOL_SEPARATOR: char = ';';
pub const OOL_AMOUNT_DESCRIPTOR: char = '^';

/// One `<amount>^<type>` section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossSection {
    /// None means every unit of the type
    pub amount: Option<u32>,
    pub unit_type: UnitTypeId,
}

/// Parse an order-of-losses string against the unit types of a state
pub fn parse_order_of_losses(ool: &str, state: &WorldState) -> Result<Vec<LossSection>> {
    let mut sections = Vec::new();

    for section in ool.trim().split(OOL_SEPARATOR) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }

        let parts: Vec<&str> = section.split(OOL_AMOUNT_DESCRIPTOR).collect();
        let [amount, type_name] = parts.as_slice() else {
            return Err(OddsError::InvalidOrderOfLosses(format!(
                "section '{}' must look like <amount>^<unit type>",
                section
            )));
        };

        let amount = if amount.trim() == OOL_ALL {
            None
        } else {
            let parsed: u32 = amount.trim().parse().map_err(|_| {
                OddsError::InvalidOrderOfLosses(format!("bad amount '{}'", amount))
            })?;
            if parsed == 0 {
                return Err(OddsError::InvalidOrderOfLosses(format!(
                    "amount must be positive in '{}'",
                    section
                )));
            }
            Some(parsed)
        };

        let unit_type = state
            .unit_type_by_name(type_name.trim())
            .ok_or_else(|| OddsError::UnknownUnitType(type_name.trim().to_string()))?;

        sections.push(LossSection {
            amount,
            unit_type: unit_type.id,
        });
    }

    Ok(sections)
}

/// Empty strings are valid and mean "no fixed order"
pub fn is_valid_order_of_losses(ool: &str, state: &WorldState) -> bool {
    ool.trim().is_empty() || parse_order_of_losses(ool, state).is_ok()
}

/// Units from `units` in the order they should be taken as casualties
///
/// Returns None when no order is configured. Units not covered by any
/// section are left out; the resolver falls back to its default order for
/// them.
pub fn units_by_order_of_losses(
    ool: Option<&str>,
    units: &[Unit],
    state: &WorldState,
) -> Result<Option<Vec<UnitId>>> {
    let Some(ool) = ool.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    let sections = parse_order_of_losses(ool, state)?;
    let mut left: Vec<&Unit> = units.iter().collect();
    left.sort_by_key(|u| u.id);

    let mut order = Vec::with_capacity(units.len());
    for section in sections.iter().rev() {
        let limit = section.amount.map_or(usize::MAX, |n| n as usize);
        let mut taken = 0;
        left.retain(|unit| {
            if taken < limit && unit.unit_type == section.unit_type {
                order.push(unit.id);
                taken += 1;
                false
            } else {
                true
            }
        });
    }
    order.reverse();

    Ok(Some(order))
}
