//! Circular workout-variant rotation.
//!
//! Variants rotate in `rotation_order`; variants without an order sort last
//! and keep their insertion order among themselves.

use crate::{Error, Result, RotationState, WorkoutVariant};
use chrono::NaiveDate;
use uuid::Uuid;

/// Variants in rotation order
pub fn ordered(variants: &[WorkoutVariant]) -> Vec<&WorkoutVariant> {
    let mut ordered: Vec<&WorkoutVariant> = variants.iter().collect();
    // Stable: ties (including all unordered variants) keep insertion order
    ordered.sort_by_key(|v| (v.rotation_order.is_none(), v.rotation_order));
    ordered
}

/// The variant that is up next
///
/// Falls back to the first variant when the pointer is unset or stale.
pub fn current<'a>(state: Option<&RotationState>, variants: &'a [WorkoutVariant]) -> Option<&'a WorkoutVariant> {
    let ordered = ordered(variants);
    state
        .and_then(|s| s.current_variant_id)
        .and_then(|id| ordered.iter().find(|v| v.id == id).copied())
        .or_else(|| ordered.first().copied())
}

/// Move the pointer one step forward, wrapping after the last variant
///
/// A pointer to a variant that no longer exists is treated as position 0.
pub fn advance(state: &mut RotationState, variants: &[WorkoutVariant], today: NaiveDate) -> Result<Uuid> {
    let ordered = ordered(variants);
    if ordered.is_empty() {
        return Err(Error::Rotation(format!(
            "group {} is rotating but has no variants",
            state.group_id
        )));
    }

    let position = match state.current_variant_id {
        Some(id) => ordered.iter().position(|v| v.id == id).unwrap_or_else(|| {
            tracing::warn!(
                "Rotation pointer {} for group {} no longer matches a variant, restarting",
                id,
                state.group_id
            );
            0
        }),
        None => 0,
    };

    let next = ordered[(position + 1) % ordered.len()];
    state.current_variant_id = Some(next.id);
    state.last_advanced_on = Some(today);

    tracing::info!(
        "Rotation for group {} advanced to {} ({})",
        state.group_id,
        next.name,
        next.id
    );
    Ok(next.id)
}
