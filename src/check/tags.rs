//! Hierarchy tag resolution
//!
//! Tags come from walking an object's `parent` chain and are returned root
//! first. The object itself contributes nothing. The walk is iterative and
//! tracks visited handles, so a malformed inventory with a loop fails
//! instead of recursing forever.

use std::collections::HashSet;
use std::fmt;

use crate::error::TagError;
use crate::inventory::{Inventory, ManagedObjectKind, ObjectHandle};

/// Name used when an ancestor is missing from the inventory
pub const UNKNOWN_NAME: &str = "unknown";

/// Keys of hierarchy tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKey {
    Host,
    Folder,
    DatastoreCluster,
    Compute,
    Cluster,
    Datacenter,
    Datastore,
    Type,
}

impl TagKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKey::Host => "host",
            TagKey::Folder => "folder",
            TagKey::DatastoreCluster => "datastore_cluster",
            TagKey::Compute => "compute",
            TagKey::Cluster => "cluster",
            TagKey::Datacenter => "datacenter",
            TagKey::Datastore => "datastore",
            TagKey::Type => "type",
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `key:value` tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: TagKey,
    pub value: String,
}

impl Tag {
    pub fn new(key: TagKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Render as `<prefix><key>:<value>`
    pub fn render(&self, prefix: &str) -> String {
        format!("{}{}:{}", prefix, self.key, self.value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// Tags contributed by a single node
fn node_tags(kind: ManagedObjectKind, name: &str, out: &mut Vec<Tag>) {
    match kind {
        ManagedObjectKind::HostSystem => out.push(Tag::new(TagKey::Host, name)),
        ManagedObjectKind::Folder => out.push(Tag::new(TagKey::Folder, name)),
        ManagedObjectKind::StoragePod => out.push(Tag::new(TagKey::DatastoreCluster, name)),
        ManagedObjectKind::ClusterComputeResource => {
            out.push(Tag::new(TagKey::Cluster, name));
            out.push(Tag::new(TagKey::Compute, name));
        }
        ManagedObjectKind::ComputeResource => out.push(Tag::new(TagKey::Compute, name)),
        ManagedObjectKind::Datacenter => out.push(Tag::new(TagKey::Datacenter, name)),
        ManagedObjectKind::Datastore => out.push(Tag::new(TagKey::Datastore, name)),
        ManagedObjectKind::VirtualMachine => {}
    }
}

/// Resolve the hierarchy tags of the ancestors of `handle`, root first
///
/// With `include_only`, tags whose key is not in the set are dropped.
pub fn resolve_tags(
    handle: &ObjectHandle,
    inventory: &Inventory,
    include_only: Option<&HashSet<TagKey>>,
) -> Result<Vec<Tag>, TagError> {
    // collected nearest first, one group per ancestor
    let mut groups: Vec<Vec<Tag>> = Vec::new();
    let mut visited: HashSet<&ObjectHandle> = HashSet::from([handle]);
    let mut current = inventory.get(handle).and_then(|p| p.parent());

    while let Some(node) = current {
        if !visited.insert(node) {
            return Err(TagError::ParentCycle {
                start: handle.to_string(),
                repeated: node.to_string(),
            });
        }

        let mut group = Vec::new();
        let Some(properties) = inventory.get(node) else {
            tracing::debug!(object = %node, "Ancestor missing from inventory");
            node_tags(node.kind, UNKNOWN_NAME, &mut group);
            groups.push(group);
            break;
        };

        node_tags(node.kind, properties.name().unwrap_or(UNKNOWN_NAME), &mut group);
        groups.push(group);
        current = properties.parent();
    }

    let mut tags: Vec<Tag> = groups.into_iter().rev().flatten().collect();
    if let Some(keys) = include_only {
        tags.retain(|t| keys.contains(&t.key));
    }

    Ok(tags)
}
