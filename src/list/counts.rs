use super::store::{ChannelStore, CountTraversal};
use crate::model::{ChannelEntity, CountAction};

impl ChannelStore {
    /// Patch unread counters for `uuid`.
    ///
    /// A top-level channel matches on its own uuid; a folder matches on its
    /// own uuid or any child's. Every match gets `action` applied and is
    /// clamped at zero. The revision advances whether or not anything
    /// matched. Returns `true` when at least one entity matched.
    pub fn apply_count_delta(&mut self, uuid: &str, action: CountAction, amount: i64) -> bool {
        let traversal = self.traversal;
        let mut matched = false;

        for entity in &mut self.entities {
            match entity {
                ChannelEntity::Channel(channel) if channel.uuid == uuid => {
                    channel.unread = action.apply(channel.unread, amount);
                    matched = true;
                }
                ChannelEntity::Folder(folder) if folder.uuid == uuid => {
                    folder.unread = action.apply(folder.unread, amount);
                    matched = true;
                }
                ChannelEntity::Folder(folder) if folder.contains(uuid) => {
                    match traversal {
                        CountTraversal::Container => {
                            folder.unread = action.apply(folder.unread, amount);
                        }
                        CountTraversal::Nested => {
                            for child in folder.children.iter_mut().filter(|c| c.uuid == uuid) {
                                child.unread = action.apply(child.unread, amount);
                            }
                            folder.unread = folder
                                .children
                                .iter()
                                .fold(0i64, |sum, c| sum.saturating_add(c.unread));
                        }
                    }
                    matched = true;
                }
                _ => {}
            }
        }

        if !matched {
            tracing::trace!(uuid = %uuid, "Count delta matched no entity");
        }
        self.touch();
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::test_support::{channel, folder, unread_of};
    use std::collections::HashMap;

    fn store(traversal: CountTraversal) -> ChannelStore {
        let mut store = ChannelStore::new(traversal);
        store.entities = vec![channel("a", 3), folder("b", 0, vec![("c", 0)])];
        store
    }

    #[test]
    fn test_child_delta_lands_on_folder_by_default() {
        let mut store = store(CountTraversal::Container);
        assert!(store.apply_count_delta("c", CountAction::Increase, 4));

        assert_eq!(unread_of(&store, "b"), 4);
        assert_eq!(unread_of(&store, "c"), 0);
        assert_eq!(unread_of(&store, "a"), 3);
    }

    #[test]
    fn test_nested_traversal_patches_child_and_sums_folder() {
        let mut store = ChannelStore::new(CountTraversal::Nested);
        store.replace(
            vec![folder("b", 0, vec![("c", 0), ("d", 0)])],
            &HashMap::from([("c".to_string(), 1), ("d".to_string(), 2), ("b".to_string(), 3)]),
        );

        store.apply_count_delta("c", CountAction::Increase, 4);
        assert_eq!(unread_of(&store, "c"), 5);
        assert_eq!(unread_of(&store, "b"), 7);
    }

    #[test]
    fn test_unmatched_delta_only_bumps_revision() {
        let mut store = store(CountTraversal::Container);
        let before = store.entities.clone();
        let revision = store.revision();

        assert!(!store.apply_count_delta("zzz", CountAction::Set, 10));
        assert_eq!(store.entities, before);
        assert_eq!(store.revision(), revision + 1);
    }

    #[test]
    fn test_decrease_clamps_and_set_replaces() {
        let mut store = store(CountTraversal::Container);
        store.apply_count_delta("a", CountAction::Decrease, 10);
        assert_eq!(unread_of(&store, "a"), 0);

        store.apply_count_delta("a", CountAction::Set, 12);
        assert_eq!(unread_of(&store, "a"), 12);

        store.apply_count_delta("a", CountAction::Set, -5);
        assert_eq!(unread_of(&store, "a"), 0);
    }

    #[test]
    fn test_upgrade_is_noop() {
        let mut store = store(CountTraversal::Container);
        store.apply_count_delta("a", CountAction::Upgrade, 100);
        assert_eq!(unread_of(&store, "a"), 3);
    }

    #[test]
    fn test_increase_saturates() {
        let mut store = store(CountTraversal::Container);
        store.apply_count_delta("a", CountAction::Increase, i64::MAX);
        assert_eq!(unread_of(&store, "a"), i64::MAX);
    }
}
