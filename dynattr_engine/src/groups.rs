//! Group-attribute merge: callback responses may carry whole descriptors,
//! not just option lists. Those "group attributes" are merged into the
//! namespace as if they had been part of the original descriptor set, and
//! are dropped again - fields included - when the parent selection that
//! produced them changes.

use crate::binding::{FieldBindings, NamespaceKey};
use crate::prelude::*;
use crate::registry::RegistryDelta;
use crate::resolver::ResolverState;

/// Merge group descriptors discovered for `parent`. Idempotent: repeating
/// the same merge leaves descriptors, bindings and collector output
/// unchanged. Descriptors whose uuid survives keep their field values;
/// previously merged descriptors missing from `incoming` are dropped and
/// their bindings destroyed.
pub(crate) fn merge_group_attributes(
    registry: &mut DescriptorRegistry,
    bindings: &mut FieldBindings,
    resolver: &mut ResolverState,
    ns: &NamespaceKey,
    parent: Uuid,
    incoming: Vec<AttributeDescriptor>,
) -> Result<RegistryDelta, RegistryError> {
    let delta = registry.merge(ns, incoming, Some(parent))?;
    for (uuid, name) in &delta.removed {
        bindings.remove(&FieldBindings::key_for(ns, name));
        resolver.forget(*uuid);
    }
    if !delta.added.is_empty() || !delta.removed.is_empty() {
        debug!(
            namespace = %ns,
            %parent,
            added = delta.added.len(),
            removed = delta.removed.len(),
            "merged group attributes"
        );
    }
    Ok(delta)
}

/// Drop everything previously merged beneath `parent`, clearing the bound
/// fields. Used when the parent's own dependency vanished (callback skipped)
/// or the parent was removed.
pub(crate) fn drop_group_attributes(
    registry: &mut DescriptorRegistry,
    bindings: &mut FieldBindings,
    resolver: &mut ResolverState,
    ns: &NamespaceKey,
    parent: Uuid,
) -> Vec<(Uuid, String)> {
    let removed = registry.drop_group_descendants(ns, parent);
    for (uuid, name) in &removed {
        bindings.remove(&FieldBindings::key_for(ns, name));
        resolver.forget(*uuid);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect;

    fn ns() -> NamespaceKey {
        NamespaceKey::new("authority", "a1")
    }

    fn simple(name: &str) -> AttributeDescriptor {
        AttributeDescriptor::new(Uuid::new_v4(), name, AttributeContentType::String)
    }

    #[test]
    fn test_merge_is_idempotent_for_collector_output() {
        let mut registry = DescriptorRegistry::new();
        let mut bindings = FieldBindings::new();
        let mut resolver = ResolverState::default();
        let parent = simple("parent");
        registry.register(&ns(), vec![parent.clone()]).unwrap();

        let extra = simple("extra");
        merge_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
            vec![extra.clone()],
        )
        .unwrap();

        // The user fills the merged field, then an unrelated re-render
        // re-fetches the same group attributes.
        bindings.set(
            FieldBindings::key_for(&ns(), "extra"),
            FieldValue::Text("kept".to_string()),
        );
        let first = collect::collect(&ns(), registry.descriptors(&ns()).unwrap(), &bindings)
            .unwrap();

        merge_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
            vec![extra.clone()],
        )
        .unwrap();
        let second = collect::collect(&ns(), registry.descriptors(&ns()).unwrap(), &bindings)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            bindings.value_of(&FieldBindings::key_for(&ns(), "extra")),
            &FieldValue::Text("kept".to_string())
        );
    }

    #[test]
    fn test_replaced_groups_clear_their_fields() {
        let mut registry = DescriptorRegistry::new();
        let mut bindings = FieldBindings::new();
        let mut resolver = ResolverState::default();
        let parent = simple("parent");
        registry.register(&ns(), vec![parent.clone()]).unwrap();

        let old_group = simple("oldGroup");
        merge_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
            vec![old_group.clone()],
        )
        .unwrap();
        bindings.set(
            FieldBindings::key_for(&ns(), "oldGroup"),
            FieldValue::Text("stale".to_string()),
        );

        // The parent selection changed; its callback now returns a
        // different group set.
        let new_group = simple("newGroup");
        merge_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
            vec![new_group],
        )
        .unwrap();

        assert_eq!(
            bindings.value_of(&FieldBindings::key_for(&ns(), "oldGroup")),
            &FieldValue::Unset
        );
        assert!(registry.descriptor_by_name(&ns(), "oldGroup").is_none());
        assert!(registry.descriptor_by_name(&ns(), "newGroup").is_some());
    }

    #[test]
    fn test_drop_clears_all_descendants() {
        let mut registry = DescriptorRegistry::new();
        let mut bindings = FieldBindings::new();
        let mut resolver = ResolverState::default();
        let parent = simple("parent");
        registry.register(&ns(), vec![parent.clone()]).unwrap();

        let child = simple("child");
        merge_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
            vec![child.clone()],
        )
        .unwrap();
        bindings.set(
            FieldBindings::key_for(&ns(), "child"),
            FieldValue::Text("x".to_string()),
        );

        let removed = drop_group_attributes(
            &mut registry,
            &mut bindings,
            &mut resolver,
            &ns(),
            parent.uuid,
        );
        assert_eq!(removed.len(), 1);
        assert_eq!(
            bindings.value_of(&FieldBindings::key_for(&ns(), "child")),
            &FieldValue::Unset
        );
    }
}
