//! Inventory reconciliation.

use crate::schema::InventoryDelta;

/// Apply `delta` to `current` and return the next inventory.
///
/// Each `remove` entry drops the first matching item, and entries naming an
/// absent item are skipped. All `add` entries are then appended in order,
/// duplicates included. Removal always happens before addition, so a delta
/// that removes and re-adds the same name leaves one copy at the end.
pub fn reconcile(current: &[String], delta: &InventoryDelta) -> Vec<String> {
    let mut next = current.to_vec();

    for item in &delta.remove {
        if let Some(idx) = next.iter().position(|held| held == item) {
            next.remove(idx);
        }
    }

    next.extend(delta.add.iter().cloned());
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn delta(add: &[&str], remove: &[&str]) -> InventoryDelta {
        InventoryDelta {
            add: items(add),
            remove: items(remove),
        }
    }

    #[test]
    fn test_add_to_empty() {
        assert_eq!(reconcile(&[], &delta(&["Torch"], &[])), items(&["Torch"]));
    }

    #[test]
    fn test_remove_single_occurrence() {
        let current = items(&["Torch", "Torch"]);
        assert_eq!(reconcile(&current, &delta(&[], &["Torch"])), items(&["Torch"]));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let current = items(&["Rope"]);
        assert_eq!(reconcile(&current, &delta(&[], &["Sword"])), current);
    }

    #[test]
    fn test_remove_first_match_keeps_order() {
        let current = items(&["Key", "Map", "Key", "Coin"]);
        assert_eq!(
            reconcile(&current, &delta(&[], &["Key"])),
            items(&["Map", "Key", "Coin"])
        );
    }

    #[test]
    fn test_duplicates_are_kept_on_add() {
        let current = items(&["Sword"]);
        assert_eq!(
            reconcile(&current, &delta(&["Sword", "Shield"], &[])),
            items(&["Sword", "Sword", "Shield"])
        );
    }

    #[test]
    fn test_remove_happens_before_add() {
        // Swapping a worn cloak for a new one of the same name.
        let current = items(&["Cloak", "Lamp"]);
        assert_eq!(
            reconcile(&current, &delta(&["Cloak"], &["Cloak"])),
            items(&["Lamp", "Cloak"])
        );

        // Re-adding never satisfies a removal from the same delta.
        assert_eq!(reconcile(&[], &delta(&["Cloak"], &["Cloak"])), items(&["Cloak"]));
    }

    #[test]
    fn test_repeated_removals_never_overdraw() {
        let current = items(&["Arrow", "Arrow", "Bow"]);
        let next = reconcile(&current, &delta(&[], &["Arrow", "Arrow", "Arrow"]));
        assert_eq!(next, items(&["Bow"]));
    }

    #[test]
    fn test_sequence_of_deltas() {
        let deltas = [
            delta(&["Torch", "Rope"], &[]),
            delta(&["Torch"], &["Rope", "Rope"]),
            delta(&[], &["Torch", "Lantern"]),
        ];

        let mut inventory = Vec::new();
        for d in &deltas {
            let before = inventory.clone();
            inventory = reconcile(&inventory, d);

            for name in &d.remove {
                let had = before.iter().filter(|i| *i == name).count();
                let has = inventory.iter().filter(|i| *i == name).count();
                let added = d.add.iter().filter(|i| *i == name).count();
                let removals = d.remove.iter().filter(|r| *r == name).count();
                assert_eq!(has, had.saturating_sub(removals) + added);
            }
        }
        assert_eq!(inventory, items(&["Torch"]));
    }
}
