//! Resource filter engine
//!
//! Filters decide which managed objects are collected. Exclusion always
//! wins; a resource type without include filters collects everything that
//! was not excluded.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::config::RawResourceFilter;
use crate::error::FilterError;
use crate::inventory::{Inventory, ObjectHandle, ResourceType};

/// Property a filter matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterProperty {
    /// The object's own name
    Name,
    /// Name of the host a VM is running on
    Hostname,
    /// Hostname reported from inside the guest
    GuestHostname,
}

impl FilterProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterProperty::Name => "name",
            FilterProperty::Hostname => "hostname",
            FilterProperty::GuestHostname => "guest_hostname",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(FilterProperty::Name),
            "hostname" => Some(FilterProperty::Hostname),
            "guest_hostname" => Some(FilterProperty::GuestHostname),
            _ => None,
        }
    }

    /// Whether `resource_type` exposes this property
    pub fn supported_by(&self, resource_type: ResourceType) -> bool {
        match self {
            FilterProperty::Name => true,
            FilterProperty::Hostname | FilterProperty::GuestHostname => {
                resource_type == ResourceType::Vm
            }
        }
    }
}

impl fmt::Display for FilterProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Include or exclude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Include,
    Exclude,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Include => "include",
            FilterKind::Exclude => "exclude",
        }
    }

    /// `whitelist` and `blacklist` are accepted as legacy spellings.
    fn parse(s: &str) -> Option<Self> {
        match s {
            "include" | "whitelist" => Some(FilterKind::Include),
            "exclude" | "blacklist" => Some(FilterKind::Exclude),
            _ => None,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated resource filter
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    resource_type: ResourceType,
    property: FilterProperty,
    kind: FilterKind,
    patterns: Vec<String>,
    compiled: Vec<Regex>,
}

impl ResourceFilter {
    /// Build a filter, compiling each pattern as a prefix match
    pub fn new(
        resource_type: ResourceType,
        property: FilterProperty,
        kind: FilterKind,
        patterns: &[String],
    ) -> Result<Self, FilterError> {
        Self::build(0, resource_type, property, kind, patterns)
    }

    fn build(
        index: usize,
        resource_type: ResourceType,
        property: FilterProperty,
        kind: FilterKind,
        patterns: &[String],
    ) -> Result<Self, FilterError> {
        if !property.supported_by(resource_type) {
            return Err(FilterError::UnsupportedProperty {
                index,
                resource: resource_type.to_string(),
                property: property.to_string(),
            });
        }

        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})", p)).map_err(|e| FilterError::InvalidPattern {
                    index,
                    pattern: p.clone(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            resource_type,
            property,
            kind,
            patterns: patterns.to_vec(),
            compiled,
        })
    }

    /// Validate one config entry; `index` is its position in the list
    pub fn from_raw(index: usize, raw: &RawResourceFilter) -> Result<Self, FilterError> {
        let resource = raw.resource.as_deref().ok_or(FilterError::MissingField {
            index,
            field: "resource",
        })?;
        let patterns = raw.patterns.as_deref().ok_or(FilterError::MissingField {
            index,
            field: "patterns",
        })?;

        let resource_type: ResourceType =
            resource.parse().map_err(|_| FilterError::UnsupportedResource {
                index,
                resource: resource.to_string(),
            })?;

        let property_name = raw.property.as_deref().unwrap_or("name");
        let property =
            FilterProperty::parse(property_name).ok_or_else(|| FilterError::UnsupportedProperty {
                index,
                resource: resource.to_string(),
                property: property_name.to_string(),
            })?;

        let type_name = raw.filter_type.as_deref().unwrap_or("include");
        let kind = FilterKind::parse(type_name).ok_or_else(|| FilterError::UnsupportedType {
            index,
            filter_type: type_name.to_string(),
        })?;

        Self::build(index, resource_type, property, kind, patterns)
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn property(&self) -> FilterProperty {
        self.property
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn is_include(&self) -> bool {
        self.kind == FilterKind::Include
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Uniqueness key within a filter set
    fn key(&self) -> (ResourceType, FilterProperty, FilterKind) {
        (self.resource_type, self.property, self.kind)
    }

    /// Whether any pattern matches the object's property value
    ///
    /// An unresolvable property value never matches.
    pub fn matches(&self, handle: &ObjectHandle, inventory: &Inventory) -> bool {
        match self.resolve_value(handle, inventory) {
            Some(value) => self.compiled.iter().any(|re| re.is_match(value)),
            None => false,
        }
    }

    fn resolve_value<'a>(
        &self,
        handle: &ObjectHandle,
        inventory: &'a Inventory,
    ) -> Option<&'a str> {
        let properties = inventory.get(handle)?;
        match self.property {
            FilterProperty::Name => properties.name(),
            FilterProperty::GuestHostname => properties.guest_hostname(),
            FilterProperty::Hostname => {
                let host = properties.runtime_host()?;
                inventory.name_of(host)
            }
        }
    }
}

/// Decide whether `handle` is collected under `filters`
pub fn is_collected(
    handle: &ObjectHandle,
    resource_type: ResourceType,
    inventory: &Inventory,
    filters: &[ResourceFilter],
) -> bool {
    let (includes, excludes): (Vec<&ResourceFilter>, Vec<&ResourceFilter>) = filters
        .iter()
        .filter(|f| f.resource_type == resource_type)
        .partition(|f| f.is_include());

    if excludes.iter().any(|f| f.matches(handle, inventory)) {
        return false;
    }

    if includes.is_empty() {
        return true;
    }

    includes.iter().any(|f| f.matches(handle, inventory))
}

/// The set of active resource filters
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<ResourceFilter>,
}

impl FilterSet {
    pub fn new(filters: Vec<ResourceFilter>) -> Self {
        Self { filters }
    }

    /// Validate config entries, returning the filters that survived and the
    /// errors for the ones that did not
    pub fn build(raw: &[RawResourceFilter]) -> (Self, Vec<FilterError>) {
        let mut filters: Vec<ResourceFilter> = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for (index, entry) in raw.iter().enumerate() {
            let filter = match ResourceFilter::from_raw(index, entry) {
                Ok(f) => f,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            if !seen.insert(filter.key()) {
                errors.push(FilterError::Duplicate {
                    index,
                    resource: filter.resource_type.to_string(),
                    property: filter.property.to_string(),
                    filter_type: filter.kind.to_string(),
                });
                continue;
            }

            filters.push(filter);
        }

        (Self { filters }, errors)
    }

    /// Like [`FilterSet::build`], logging each dropped definition as a warning
    pub fn from_config(raw: &[RawResourceFilter]) -> Self {
        let (set, errors) = Self::build(raw);
        for error in &errors {
            warn!(error = %error, "Ignoring resource filter");
        }
        set
    }

    pub fn is_collected(
        &self,
        handle: &ObjectHandle,
        resource_type: ResourceType,
        inventory: &Inventory,
    ) -> bool {
        is_collected(handle, resource_type, inventory, &self.filters)
    }

    pub fn filters(&self) -> &[ResourceFilter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
