//! Stratigraphic classification hierarchy.
//!
//! # Invariants
//! - Parent links form a forest: walking parents from any unit reaches a root.
//! - Unit names are unique and non-blank after trimming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UnitId = Uuid;

/// Named node of the stratigraphic hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratUnit {
    pub id: UnitId,
    pub name: String,
    /// Age in project units (typically Ma); `None` when unknown.
    pub age: Option<f64>,
    pub parent_id: Option<UnitId>,
}

impl StratUnit {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Outcome of walking a parent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainWalk {
    /// Reached a root without meeting the unit.
    Acyclic,
    /// Met the unit being re-parented: the new link would close a cycle.
    ReachesUnit,
    /// Took more steps than there are units; stored links are already cyclic.
    Exhausted,
}

/// Walks the parent chain from `new_parent` towards the root, looking for `unit_id`.
///
/// `parent_of` resolves one link. `max_steps` bounds the walk (use the unit count).
pub fn walk_parent_chain<E, F>(
    unit_id: UnitId,
    new_parent: UnitId,
    max_steps: usize,
    mut parent_of: F,
) -> Result<ChainWalk, E>
where
    F: FnMut(UnitId) -> Result<Option<UnitId>, E>,
{
    let mut current = Some(new_parent);
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == unit_id {
            return Ok(ChainWalk::ReachesUnit);
        }
        if steps > max_steps {
            return Ok(ChainWalk::Exhausted);
        }
        steps += 1;
        current = parent_of(id)?;
    }
    Ok(ChainWalk::Acyclic)
}

/// Trims a unit name; blank names are rejected.
pub fn normalize_unit_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Negative or non-finite ages mean "unknown".
pub fn normalize_age(age: Option<f64>) -> Option<f64> {
    age.filter(|value| value.is_finite() && *value >= 0.0)
}
