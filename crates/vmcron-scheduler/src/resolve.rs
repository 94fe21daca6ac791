use std::sync::Arc;

use tracing::debug;
use vmcron_core::types::{Resource, TargetKind, TargetRef};

use crate::error::Result;
use crate::store::ResourceCatalog;

/// Expands a schedule target into the concrete resources to act on.
#[derive(Clone)]
pub struct TargetResolver {
    catalog: Arc<dyn ResourceCatalog>,
}

impl TargetResolver {
    pub fn new(catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self { catalog }
    }

    /// Resources targeted right now, in catalog order.
    ///
    /// A vanished resource or group yields an empty list rather than an error.
    pub fn resolve(&self, target: TargetRef) -> Result<Vec<Resource>> {
        let resources = match target.kind {
            TargetKind::Vm => self.catalog.get_resource(target.id)?.into_iter().collect(),
            TargetKind::Group => self.catalog.get_group_members(target.id)?,
        };
        debug!(%target, count = resources.len(), "resolved targets");
        Ok(resources)
    }

    /// Whether `target` currently refers to an existing resource or group.
    pub fn exists(&self, target: TargetRef) -> Result<bool> {
        match target.kind {
            TargetKind::Vm => Ok(self.catalog.get_resource(target.id)?.is_some()),
            TargetKind::Group => self.catalog.group_exists(target.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use vmcron_core::types::{NewResource, ResourceKind};

    fn guest(vmid: u32) -> NewResource {
        NewResource {
            vmid,
            name: format!("vm{vmid}"),
            kind: ResourceKind::Qemu,
            node: "pve1".to_string(),
            status: None,
            maxmem: None,
            maxdisk: None,
            uptime: None,
        }
    }

    #[test]
    fn resolves_single_and_group_targets() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let a = store.upsert_resource(&guest(101)).unwrap().id();
        let b = store.upsert_resource(&guest(102)).unwrap().id();
        let group = store.create_group("pair", None).unwrap();
        store.add_group_member(group.id, a).unwrap();
        store.add_group_member(group.id, b).unwrap();

        let resolver = TargetResolver::new(store);
        let single = resolver.resolve(TargetRef::vm(a)).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].vmid, 101);

        let members = resolver.resolve(TargetRef::group(group.id)).unwrap();
        assert_eq!(members.iter().map(|r| r.vmid).collect::<Vec<_>>(), vec![101, 102]);
        assert!(resolver.exists(TargetRef::group(group.id)).unwrap());
    }

    #[test]
    fn missing_targets_resolve_to_nothing() {
        let resolver = TargetResolver::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        assert!(resolver.resolve(TargetRef::vm(42)).unwrap().is_empty());
        assert!(resolver.resolve(TargetRef::group(42)).unwrap().is_empty());
        assert!(!resolver.exists(TargetRef::vm(42)).unwrap());
    }
}
