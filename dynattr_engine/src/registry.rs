//! The descriptor registry: the per-form source of truth for which
//! attribute descriptors exist, in which namespace, and what depends on
//! what.
//!
//! The registry exclusively owns descriptor lifetime for a form instance.
//! It also maintains the callback dependency adjacency map (source field
//! name to dependent descriptor uuids), rebuilt on every mutation so that
//! resolution stays O(dependents) rather than rescanning all descriptors on
//! every keystroke.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::binding::NamespaceKey;
use crate::prelude::*;

/// What changed in a registry mutation. The engine uses `removed` to destroy
/// the bindings of descriptors that no longer exist.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryDelta {
    pub added: Vec<Uuid>,
    pub removed: Vec<(Uuid, String)>,
}

#[derive(Debug, Default)]
struct NamespaceEntry {
    /// Registry order - the order the backend supplied and the order the
    /// collector walks.
    descriptors: Vec<AttributeDescriptor>,
    /// Source field name -> dependent descriptor uuids, in registry order.
    dependents: BTreeMap<String, Vec<Uuid>>,
    /// Parent descriptor uuid -> group descriptor uuids merged beneath it.
    group_sources: BTreeMap<Uuid, Vec<Uuid>>,
}

impl NamespaceEntry {
    fn rebuild_dependents(&mut self) {
        self.dependents.clear();
        for d in &self.descriptors {
            let Some(cb) = &d.callback else {
                continue;
            };
            for mapping in &cb.mappings {
                if let Some(from) = &mapping.from {
                    let deps = self.dependents.entry(from.clone()).or_default();
                    if !deps.contains(&d.uuid) {
                        deps.push(d.uuid);
                    }
                }
            }
        }
    }

    fn position(&self, uuid: Uuid) -> Option<usize> {
        self.descriptors.iter().position(|d| d.uuid == uuid)
    }

    fn is_group(&self, uuid: Uuid) -> bool {
        self.group_sources.values().any(|v| v.contains(&uuid))
    }

    /// Remove a descriptor and, transitively, any group descriptors merged
    /// beneath it. Returns everything removed.
    fn remove_with_groups(&mut self, uuid: Uuid) -> Vec<(Uuid, String)> {
        let mut removed = Vec::new();
        let mut stack = vec![uuid];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.group_sources.remove(&current) {
                stack.extend(children);
            }
            if let Some(pos) = self.position(current) {
                let d = self.descriptors.remove(pos);
                removed.push((d.uuid, d.name));
            }
            for children in self.group_sources.values_mut() {
                children.retain(|c| *c != current);
            }
        }
        removed
    }
}

/// The registry for one form instance. Mutated only by the callback
/// resolver and the group-attribute merge, both driven through the engine;
/// the value collector only reads.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    namespaces: HashMap<NamespaceKey, NamespaceEntry>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        DescriptorRegistry {
            namespaces: HashMap::new(),
        }
    }

    /// Replace the descriptor set for a namespace. Field keys must be unique
    /// per namespace, so a `name` collision in the incoming list is a caller
    /// error and nothing is applied. Descriptors that survive the
    /// replacement (same uuid) keep their bindings; everything else is
    /// reported in `removed` for cleanup. Runtime-merged group descriptors
    /// never survive a replacement.
    pub fn register(
        &mut self,
        ns: &NamespaceKey,
        descriptors: Vec<AttributeDescriptor>,
    ) -> Result<RegistryDelta, RegistryError> {
        for (i, d) in descriptors.iter().enumerate() {
            if descriptors[..i].iter().any(|o| o.name == d.name) {
                return Err(RegistryError::DuplicateName {
                    namespace: ns.to_string(),
                    name: d.name.clone(),
                });
            }
            if descriptors[..i].iter().any(|o| o.uuid == d.uuid) {
                return Err(RegistryError::UuidCollision {
                    namespace: ns.to_string(),
                    uuid: d.uuid,
                });
            }
        }

        let entry = self.namespaces.entry(ns.clone()).or_default();
        let removed = entry
            .descriptors
            .iter()
            .filter(|old| !descriptors.iter().any(|new| new.uuid == old.uuid))
            .map(|old| (old.uuid, old.name.clone()))
            .collect();
        let added = descriptors
            .iter()
            .filter(|new| entry.position(new.uuid).is_none())
            .map(|new| new.uuid)
            .collect();

        entry.descriptors = descriptors;
        entry.group_sources.clear();
        entry.rebuild_dependents();
        debug!(namespace = %ns, count = entry.descriptors.len(), "registered descriptor set");
        Ok(RegistryDelta { added, removed })
    }

    /// Remove a namespace entirely. The caller is responsible for clearing
    /// the field family.
    pub fn clear(&mut self, ns: &NamespaceKey) -> bool {
        let existed = self.namespaces.remove(ns).is_some();
        if existed {
            debug!(namespace = %ns, "cleared namespace");
        }
        existed
    }

    /// Merge descriptors discovered at runtime into a namespace. Identity is
    /// compared by `uuid`, never by position, so a reordered server response
    /// does not reset unrelated fields. With `parent` set this is a
    /// group-attribute merge: previously merged group descriptors of that
    /// parent which are absent from `incoming` are dropped, and a uuid
    /// collision with a non-group descriptor is a fail-fast error.
    pub fn merge(
        &mut self,
        ns: &NamespaceKey,
        incoming: Vec<AttributeDescriptor>,
        parent: Option<Uuid>,
    ) -> Result<RegistryDelta, RegistryError> {
        let entry = self
            .namespaces
            .get_mut(ns)
            .ok_or_else(|| RegistryError::UnknownNamespace(ns.to_string()))?;

        // Group descriptors of `parent` that this merge replaces. A stale
        // descriptor's name may be reused by its replacement, so staleness
        // is decided before any collision check.
        let stale: Vec<Uuid> = match parent {
            Some(parent) => entry
                .group_sources
                .get(&parent)
                .map(|old| {
                    old.iter()
                        .filter(|u| !incoming.iter().any(|d| d.uuid == **u))
                        .copied()
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        // Validate everything before touching state.
        for (i, d) in incoming.iter().enumerate() {
            if incoming[..i].iter().any(|o| o.name == d.name) {
                return Err(RegistryError::DuplicateName {
                    namespace: ns.to_string(),
                    name: d.name.clone(),
                });
            }
            match entry.position(d.uuid) {
                Some(_) => {
                    if parent.is_some() && !entry.is_group(d.uuid) {
                        return Err(RegistryError::UuidCollision {
                            namespace: ns.to_string(),
                            uuid: d.uuid,
                        });
                    }
                }
                None => {
                    let collides = entry
                        .descriptors
                        .iter()
                        .any(|o| o.name == d.name && !stale.contains(&o.uuid));
                    if collides {
                        return Err(RegistryError::DuplicateName {
                            namespace: ns.to_string(),
                            name: d.name.clone(),
                        });
                    }
                }
            }
        }

        let mut delta = RegistryDelta::default();
        for uuid in stale {
            delta.removed.extend(entry.remove_with_groups(uuid));
        }

        for d in incoming.iter() {
            match entry.position(d.uuid) {
                Some(pos) => {
                    // Update in place: position and bindings are preserved.
                    entry.descriptors[pos] = d.clone();
                }
                None => {
                    delta.added.push(d.uuid);
                    entry.descriptors.push(d.clone());
                }
            }
        }

        if let Some(parent) = parent {
            entry
                .group_sources
                .insert(parent, incoming.iter().map(|d| d.uuid).collect());
        }

        entry.rebuild_dependents();
        debug!(
            namespace = %ns,
            added = delta.added.len(),
            removed = delta.removed.len(),
            "merged descriptors"
        );
        Ok(delta)
    }

    /// Drop every group descriptor merged beneath `parent`, transitively.
    /// Used when the parent's dependency disappears or its callback is
    /// skipped.
    pub fn drop_group_descendants(&mut self, ns: &NamespaceKey, parent: Uuid) -> Vec<(Uuid, String)> {
        let Some(entry) = self.namespaces.get_mut(ns) else {
            return Vec::new();
        };
        let children = entry.group_sources.remove(&parent).unwrap_or_default();
        let mut removed = Vec::new();
        for child in children {
            removed.extend(entry.remove_with_groups(child));
        }
        if !removed.is_empty() {
            entry.rebuild_dependents();
        }
        removed
    }

    pub fn is_registered(&self, ns: &NamespaceKey) -> bool {
        self.namespaces.contains_key(ns)
    }

    pub fn descriptors(&self, ns: &NamespaceKey) -> Option<&[AttributeDescriptor]> {
        self.namespaces.get(ns).map(|e| e.descriptors.as_slice())
    }

    pub fn descriptor_by_name(
        &self,
        ns: &NamespaceKey,
        name: &str,
    ) -> Option<&AttributeDescriptor> {
        self.namespaces
            .get(ns)
            .and_then(|e| e.descriptors.iter().find(|d| d.name == name))
    }

    pub fn descriptor_by_uuid(&self, ns: &NamespaceKey, uuid: Uuid) -> Option<&AttributeDescriptor> {
        self.namespaces
            .get(ns)
            .and_then(|e| e.descriptors.iter().find(|d| d.uuid == uuid))
    }

    /// Replace a descriptor's content (its option set) after a callback
    /// resolution.
    pub fn replace_content(
        &mut self,
        ns: &NamespaceKey,
        uuid: Uuid,
        content: Vec<AttributeContent>,
    ) -> Result<(), RegistryError> {
        let entry = self
            .namespaces
            .get_mut(ns)
            .ok_or_else(|| RegistryError::UnknownNamespace(ns.to_string()))?;
        let pos = entry
            .position(uuid)
            .ok_or_else(|| RegistryError::UnknownAttribute(uuid.to_string()))?;
        entry.descriptors[pos].content = content;
        Ok(())
    }

    /// Descriptor uuids whose callbacks name `field_name` as a `from`
    /// source, in registry order.
    pub fn dependents_of(&self, ns: &NamespaceKey, field_name: &str) -> Vec<Uuid> {
        self.namespaces
            .get(ns)
            .and_then(|e| e.dependents.get(field_name))
            .cloned()
            .unwrap_or_default()
    }

    /// All descriptors in the namespace that declare a callback, in registry
    /// order. Used for the initial resolution pass after registration.
    pub fn callback_descriptors(&self, ns: &NamespaceKey) -> Vec<Uuid> {
        self.namespaces
            .get(ns)
            .map(|e| {
                e.descriptors
                    .iter()
                    .filter(|d| d.callback.is_some())
                    .map(|d| d.uuid)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::NamespaceKey;

    fn ns() -> NamespaceKey {
        NamespaceKey::new("connector", "c1")
    }

    fn simple(name: &str) -> AttributeDescriptor {
        AttributeDescriptor::new(Uuid::new_v4(), name, AttributeContentType::String)
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        // Two descriptors sharing a name in one namespace must fail before
        // any field renders.
        let mut reg = DescriptorRegistry::new();
        let err = reg
            .register(&ns(), vec![simple("token"), simple("token")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { ref name, .. } if name == "token"));
        assert!(!reg.is_registered(&ns()));
    }

    #[test]
    fn test_register_reports_removed_descriptors() {
        let mut reg = DescriptorRegistry::new();
        let keep = simple("keep");
        let drop_me = simple("drop");
        reg.register(&ns(), vec![keep.clone(), drop_me.clone()])
            .unwrap();

        let delta = reg.register(&ns(), vec![keep.clone()]).unwrap();
        assert_eq!(delta.removed, vec![(drop_me.uuid, "drop".to_string())]);
        assert!(delta.added.is_empty());
    }

    #[test]
    fn test_merge_updates_by_uuid_not_position() {
        let mut reg = DescriptorRegistry::new();
        let a = simple("a");
        let b = simple("b");
        reg.register(&ns(), vec![a.clone(), b.clone()]).unwrap();

        // Reordered response: same uuids, nothing removed, nothing added.
        let delta = reg.merge(&ns(), vec![b.clone(), a.clone()], None).unwrap();
        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        // Original registry order is preserved.
        let names: Vec<_> = reg
            .descriptors(&ns())
            .unwrap()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_group_merge_uuid_collision_fails_fast() {
        let mut reg = DescriptorRegistry::new();
        let base = simple("base");
        reg.register(&ns(), vec![base.clone()]).unwrap();

        let mut imposter = simple("imposter");
        imposter.uuid = base.uuid;
        let parent = Uuid::new_v4();
        let err = reg.merge(&ns(), vec![imposter], Some(parent)).unwrap_err();
        assert!(matches!(err, RegistryError::UuidCollision { uuid, .. } if uuid == base.uuid));
        // Nothing was applied.
        assert_eq!(reg.descriptors(&ns()).unwrap().len(), 1);
        assert_eq!(reg.descriptors(&ns()).unwrap()[0].name, "base");
    }

    #[test]
    fn test_group_merge_drops_stale_children() {
        let mut reg = DescriptorRegistry::new();
        let parent = simple("parent");
        reg.register(&ns(), vec![parent.clone()]).unwrap();

        let g1 = simple("g1");
        let g2 = simple("g2");
        reg.merge(&ns(), vec![g1.clone(), g2.clone()], Some(parent.uuid))
            .unwrap();
        assert_eq!(reg.descriptors(&ns()).unwrap().len(), 3);

        // A later merge for the same parent returns only g1: g2 is stale.
        let delta = reg.merge(&ns(), vec![g1.clone()], Some(parent.uuid)).unwrap();
        assert_eq!(delta.removed, vec![(g2.uuid, "g2".to_string())]);
        assert_eq!(reg.descriptors(&ns()).unwrap().len(), 2);
    }

    #[test]
    fn test_group_merge_allows_name_reuse_by_replacement() {
        // A different parent selection returns a fresh descriptor with the
        // same name but a new uuid: the stale one is replaced, not a
        // collision.
        let mut reg = DescriptorRegistry::new();
        let parent = simple("parent");
        reg.register(&ns(), vec![parent.clone()]).unwrap();

        let old = simple("keyLength");
        reg.merge(&ns(), vec![old.clone()], Some(parent.uuid))
            .unwrap();

        let new = simple("keyLength");
        let delta = reg.merge(&ns(), vec![new.clone()], Some(parent.uuid)).unwrap();
        assert_eq!(delta.removed, vec![(old.uuid, "keyLength".to_string())]);
        assert_eq!(delta.added, vec![new.uuid]);
        assert_eq!(
            reg.descriptor_by_name(&ns(), "keyLength").map(|d| d.uuid),
            Some(new.uuid)
        );
    }

    #[test]
    fn test_drop_group_descendants_is_transitive() {
        let mut reg = DescriptorRegistry::new();
        let parent = simple("parent");
        reg.register(&ns(), vec![parent.clone()]).unwrap();

        let child = simple("child");
        reg.merge(&ns(), vec![child.clone()], Some(parent.uuid))
            .unwrap();
        let grandchild = simple("grandchild");
        reg.merge(&ns(), vec![grandchild.clone()], Some(child.uuid))
            .unwrap();

        let removed = reg.drop_group_descendants(&ns(), parent.uuid);
        let mut removed_names: Vec<_> = removed.iter().map(|(_, n)| n.as_str()).collect();
        removed_names.sort_unstable();
        assert_eq!(removed_names, vec!["child", "grandchild"]);
        assert_eq!(reg.descriptors(&ns()).unwrap().len(), 1);
    }

    #[test]
    fn test_dependents_adjacency() {
        let mut reg = DescriptorRegistry::new();
        let ca = simple("ca");
        let mut template = simple("template");
        template.callback = Some(AttributeCallback::new(
            "coreGetTemplates",
            "GET",
            vec![CallbackMapping::source(
                "ca",
                "caId",
                vec![CallbackTarget::PathVariable],
            )],
        ));
        reg.register(&ns(), vec![ca.clone(), template.clone()])
            .unwrap();

        assert_eq!(reg.dependents_of(&ns(), "ca"), vec![template.uuid]);
        assert!(reg.dependents_of(&ns(), "template").is_empty());
        assert_eq!(reg.callback_descriptors(&ns()), vec![template.uuid]);
    }
}
