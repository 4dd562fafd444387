//! All sqlx access lives under this module. Current-state tables are
//! mutated only by the reconciliation engine; history tables are insert-only.

pub mod api_keys;
pub mod machines;
pub mod reconcile;
pub mod registry;
pub mod reports;
pub mod tenancy;

use stocktake_core::model::Scope;
use uuid::Uuid;

/// Flatten a tenancy scope into the three nullable bind parameters the
/// listing queries share: (business_unit_id, machine_group_id, machine_id).
/// A NULL bind disables that level of filtering.
pub(crate) fn scope_binds(scope: Scope) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>) {
    match scope {
        Scope::All => (None, None, None),
        Scope::BusinessUnit(id) => (Some(id), None, None),
        Scope::MachineGroup(id) => (None, Some(id), None),
        Scope::Machine(id) => (None, None, Some(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_binds_fill_exactly_one_level() {
        let id = Uuid::now_v7();
        assert_eq!(scope_binds(Scope::All), (None, None, None));
        assert_eq!(scope_binds(Scope::BusinessUnit(id)), (Some(id), None, None));
        assert_eq!(scope_binds(Scope::MachineGroup(id)), (None, Some(id), None));
        assert_eq!(scope_binds(Scope::Machine(id)), (None, None, Some(id)));
    }
}
