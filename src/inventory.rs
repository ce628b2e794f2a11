//! Cycle-scoped view of the managed object graph
//!
//! The gateway returns every managed object as a handle plus a flat bag of
//! properties. [`Inventory`] keeps that mapping for the duration of one
//! collection cycle; nothing here is cached across cycles.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Property holding the object's display name
pub const PROP_NAME: &str = "name";
/// Property holding the parent object reference
pub const PROP_PARENT: &str = "parent";
/// Property holding the host a VM is running on
pub const PROP_RUNTIME_HOST: &str = "runtime.host";
/// Property holding the hostname reported by VMware tools
pub const PROP_GUEST_HOSTNAME: &str = "guest.hostName";
/// Property holding the VM power state
pub const PROP_POWER_STATE: &str = "runtime.powerState";

/// Power state value for a running VM
pub const POWERED_ON: &str = "poweredOn";

/// Kinds of managed objects the collector understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ManagedObjectKind {
    Folder,
    StoragePod,
    Datacenter,
    ComputeResource,
    ClusterComputeResource,
    HostSystem,
    VirtualMachine,
    Datastore,
}

impl ManagedObjectKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedObjectKind::Folder => "Folder",
            ManagedObjectKind::StoragePod => "StoragePod",
            ManagedObjectKind::Datacenter => "Datacenter",
            ManagedObjectKind::ComputeResource => "ComputeResource",
            ManagedObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ManagedObjectKind::HostSystem => "HostSystem",
            ManagedObjectKind::VirtualMachine => "VirtualMachine",
            ManagedObjectKind::Datastore => "Datastore",
        }
    }

    /// Parse a wire name, returning `None` for kinds outside the model
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "Folder" => Some(ManagedObjectKind::Folder),
            "StoragePod" => Some(ManagedObjectKind::StoragePod),
            "Datacenter" => Some(ManagedObjectKind::Datacenter),
            "ComputeResource" => Some(ManagedObjectKind::ComputeResource),
            "ClusterComputeResource" => Some(ManagedObjectKind::ClusterComputeResource),
            "HostSystem" => Some(ManagedObjectKind::HostSystem),
            "VirtualMachine" => Some(ManagedObjectKind::VirtualMachine),
            "Datastore" => Some(ManagedObjectKind::Datastore),
            _ => None,
        }
    }
}

impl fmt::Display for ManagedObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-issued reference to a managed object
///
/// Only meaningful inside the cycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    #[serde(rename = "type")]
    pub kind: ManagedObjectKind,
    pub id: String,
}

impl ObjectHandle {
    pub fn new(kind: ManagedObjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A single property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Plain text (numbers and booleans are stored in their text form)
    Text(String),
    /// Reference to another managed object
    Handle(ObjectHandle),
}

/// Flat property map for one managed object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    properties: HashMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text property
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, PropertyValue::Text(value.into()));
        self
    }

    /// Add a reference property
    pub fn with_handle(mut self, key: impl Into<String>, handle: ObjectHandle) -> Self {
        self.insert(key, PropertyValue::Handle(handle));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Text value of `key`, if present and textual
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(PropertyValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Reference value of `key`, if present and a reference
    pub fn handle(&self, key: &str) -> Option<&ObjectHandle> {
        match self.properties.get(key) {
            Some(PropertyValue::Handle(h)) => Some(h),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.text(PROP_NAME)
    }

    pub fn parent(&self) -> Option<&ObjectHandle> {
        self.handle(PROP_PARENT)
    }

    pub fn runtime_host(&self) -> Option<&ObjectHandle> {
        self.handle(PROP_RUNTIME_HOST)
    }

    pub fn guest_hostname(&self) -> Option<&str> {
        self.text(PROP_GUEST_HOSTNAME)
    }

    pub fn power_state(&self) -> Option<&str> {
        self.text(PROP_POWER_STATE)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Handle to property bag mapping for one collection cycle
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    objects: HashMap<ObjectHandle, PropertyBag>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ObjectHandle, properties: PropertyBag) {
        self.objects.insert(handle, properties);
    }

    /// Builder form of [`Inventory::insert`]
    pub fn with_object(mut self, handle: ObjectHandle, properties: PropertyBag) -> Self {
        self.insert(handle, properties);
        self
    }

    pub fn get(&self, handle: &ObjectHandle) -> Option<&PropertyBag> {
        self.objects.get(handle)
    }

    pub fn contains(&self, handle: &ObjectHandle) -> bool {
        self.objects.contains_key(handle)
    }

    /// Name of `handle`, if the object is known and named
    pub fn name_of(&self, handle: &ObjectHandle) -> Option<&str> {
        self.objects.get(handle).and_then(PropertyBag::name)
    }

    /// All handles of the given kind, ordered by id
    pub fn handles_of(&self, kind: ManagedObjectKind) -> Vec<&ObjectHandle> {
        let mut handles: Vec<&ObjectHandle> =
            self.objects.keys().filter(|h| h.kind == kind).collect();
        handles.sort();
        handles
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectHandle, &PropertyBag)> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Collectable resource types
///
/// `vm` and `host` are realtime resources reported against a hostname.
/// The others are historical and reported with tags only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Vm,
    Host,
    Datastore,
    Datacenter,
    Cluster,
}

impl ResourceType {
    pub const REALTIME: [ResourceType; 2] = [ResourceType::Vm, ResourceType::Host];

    pub const HISTORICAL: [ResourceType; 3] = [
        ResourceType::Datastore,
        ResourceType::Datacenter,
        ResourceType::Cluster,
    ];

    pub const ALL: [ResourceType; 5] = [
        ResourceType::Vm,
        ResourceType::Host,
        ResourceType::Datastore,
        ResourceType::Datacenter,
        ResourceType::Cluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Vm => "vm",
            ResourceType::Host => "host",
            ResourceType::Datastore => "datastore",
            ResourceType::Datacenter => "datacenter",
            ResourceType::Cluster => "cluster",
        }
    }

    /// Managed object kind backing this resource type
    pub fn kind(&self) -> ManagedObjectKind {
        match self {
            ResourceType::Vm => ManagedObjectKind::VirtualMachine,
            ResourceType::Host => ManagedObjectKind::HostSystem,
            ResourceType::Datastore => ManagedObjectKind::Datastore,
            ResourceType::Datacenter => ManagedObjectKind::Datacenter,
            ResourceType::Cluster => ManagedObjectKind::ClusterComputeResource,
        }
    }

    pub fn is_realtime(&self) -> bool {
        matches!(self, ResourceType::Vm | ResourceType::Host)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    /// Case-insensitive, so `VM` and `vm` are the same resource.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vm" => Ok(ResourceType::Vm),
            "host" => Ok(ResourceType::Host),
            "datastore" => Ok(ResourceType::Datastore),
            "datacenter" => Ok(ResourceType::Datacenter),
            "cluster" => Ok(ResourceType::Cluster),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}
