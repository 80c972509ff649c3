use std::fmt;

use crate::client::SourceDevice;
use crate::sync::types::{FilterPolicy, IdentifierSet};

/// Why a device was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    MissingIdentifier,
    Unowned,
    MobileExcluded,
    NoIncludedTag,
    ExcludedTag,
    ExcludedBlueprint,
    BlueprintNotIncluded,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingIdentifier => "missing serial number",
            Self::Unowned => "no assigned owner",
            Self::MobileExcluded => "mobile device",
            Self::NoIncludedTag => "no included tag",
            Self::ExcludedTag => "excluded tag",
            Self::ExcludedBlueprint => "excluded blueprint",
            Self::BlueprintNotIncluded => "blueprint not included",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled [`FilterPolicy`].
///
/// Rules are evaluated in a fixed order and the first rejection wins:
/// identifier, owner, platform, include tags, exclude tags, blueprint.
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    require_owner: bool,
    include_mobile: bool,
    include_tags: IdentifierSet,
    exclude_tags: IdentifierSet,
    include_blueprint_ids: IdentifierSet,
    include_blueprint_names: IdentifierSet,
    exclude_blueprint_ids: IdentifierSet,
    exclude_blueprint_names: IdentifierSet,
}

impl DeviceFilter {
    pub fn new(policy: &FilterPolicy) -> Self {
        let set = |values: &[String]| values.iter().cloned().collect::<IdentifierSet>();
        Self {
            require_owner: policy.require_owner,
            include_mobile: policy.include_mobile,
            include_tags: set(&policy.include_tags),
            exclude_tags: set(&policy.exclude_tags),
            include_blueprint_ids: set(&policy.blueprints_include.ids),
            include_blueprint_names: set(&policy.blueprints_include.names),
            exclude_blueprint_ids: set(&policy.blueprints_exclude.ids),
            exclude_blueprint_names: set(&policy.blueprints_exclude.names),
        }
    }

    /// Admit or reject a single device.
    pub fn evaluate(&self, device: &SourceDevice) -> Result<(), RejectReason> {
        if device.identifier.is_empty() {
            return Err(RejectReason::MissingIdentifier);
        }
        if self.require_owner && !device.is_owned() {
            return Err(RejectReason::Unowned);
        }
        if device.platform.is_mobile() && !self.include_mobile {
            return Err(RejectReason::MobileExcluded);
        }
        if !self.include_tags.is_empty() && !self.include_tags.contains_any(&device.tags) {
            return Err(RejectReason::NoIncludedTag);
        }
        if self.exclude_tags.contains_any(&device.tags) {
            return Err(RejectReason::ExcludedTag);
        }
        self.evaluate_blueprint(device)
    }

    fn evaluate_blueprint(&self, device: &SourceDevice) -> Result<(), RejectReason> {
        let assignment = &device.assignment;
        if self.exclude_blueprint_ids.contains(&assignment.blueprint_id)
            || self.exclude_blueprint_names.contains(&assignment.blueprint_name)
        {
            return Err(RejectReason::ExcludedBlueprint);
        }
        if self.include_blueprint_ids.is_empty() && self.include_blueprint_names.is_empty() {
            return Ok(());
        }
        if self.include_blueprint_ids.contains(&assignment.blueprint_id)
            || self.include_blueprint_names.contains(&assignment.blueprint_name)
        {
            Ok(())
        } else {
            Err(RejectReason::BlueprintNotIncluded)
        }
    }
}

/// Result of filtering a device inventory.
#[derive(Debug)]
pub struct FilterOutcome<'a> {
    /// Admitted devices, in source order.
    pub eligible: Vec<&'a SourceDevice>,
    /// Rejected devices with the first failing rule.
    pub rejected: Vec<(&'a SourceDevice, RejectReason)>,
}

/// Split `devices` into eligible and rejected.
pub fn filter_devices<'a>(devices: &'a [SourceDevice], filter: &DeviceFilter) -> FilterOutcome<'a> {
    let mut eligible = Vec::with_capacity(devices.len());
    let mut rejected = Vec::new();

    for device in devices {
        match filter.evaluate(device) {
            Ok(()) => eligible.push(device),
            Err(reason) => rejected.push((device, reason)),
        }
    }

    FilterOutcome { eligible, rejected }
}
