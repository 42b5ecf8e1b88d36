// SPDX-License-Identifier: GPL-3.0-only

//! Mirror of device property values
//!
//! The controller keeps its own copy of every property it reasons about. The
//! copy is refreshed from property notifications and written through after
//! each successful property write, so decisions like "is live view routed to
//! the host" never need a device round trip.

use super::types::{PropertyId, dof_preview, evf_output, save_to};
use crate::constants::JPEG_ONLY_QUALITIES;
use std::collections::BTreeMap;

/// Current value and allowed-value list of one property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySlot {
    pub value: Option<u32>,
    pub allowed: Vec<u32>,
}

/// Last known values of the mirrored properties, keyed by property id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraPropertySet {
    slots: BTreeMap<PropertyId, PropertySlot>,
}

impl CameraPropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both exposure-mode identifiers share one slot
    fn key(id: PropertyId) -> PropertyId {
        match id {
            PropertyId::AeModeSelect => PropertyId::AeMode,
            other => other,
        }
    }

    /// Record a value. Returns true if it changed.
    pub fn update_value(&mut self, id: PropertyId, value: u32) -> bool {
        let slot = self.slots.entry(Self::key(id)).or_default();
        let changed = slot.value != Some(value);
        slot.value = Some(value);
        changed
    }

    /// Record the allowed-value list of an enumerated property
    ///
    /// Lists for properties the device does not enumerate are ignored.
    pub fn update_allowed(&mut self, id: PropertyId, values: Vec<u32>) {
        let key = Self::key(id);
        if !key.is_enumerated() {
            return;
        }
        self.slots.entry(key).or_default().allowed = values;
    }

    pub fn value(&self, id: PropertyId) -> Option<u32> {
        self.slots.get(&Self::key(id)).and_then(|s| s.value)
    }

    pub fn allowed(&self, id: PropertyId) -> &[u32] {
        self.slots
            .get(&Self::key(id))
            .map(|s| s.allowed.as_slice())
            .unwrap_or(&[])
    }

    /// Whether a write is needed to reach `desired`
    ///
    /// An unknown value counts as different.
    pub fn differs_from(&self, id: PropertyId, desired: u32) -> bool {
        self.value(id) != Some(desired)
    }

    /// Live-view routing bit set (zero when unknown)
    pub fn live_view_output(&self) -> u32 {
        self.value(PropertyId::EvfOutputDevice).unwrap_or(0)
    }

    /// Whether live view is routed to the host
    pub fn routes_to_host(&self) -> bool {
        self.live_view_output() & evf_output::PC != 0
    }

    pub fn saves_to_host(&self) -> bool {
        self.value(PropertyId::SaveTo) == Some(save_to::HOST)
    }

    pub fn dof_preview_active(&self) -> bool {
        self.value(PropertyId::EvfDepthOfFieldPreview)
            .is_some_and(|v| v != dof_preview::OFF)
    }

    pub fn exposure_mode(&self) -> Option<u32> {
        self.value(PropertyId::AeMode)
    }

    /// Image quality to write so the device produces JPEG-only output
    ///
    /// `None` when the current quality is already JPEG-only or when the device
    /// offers no JPEG-only quality.
    pub fn jpeg_only_quality(&self) -> Option<u32> {
        if self
            .value(PropertyId::ImageQuality)
            .is_some_and(|q| JPEG_ONLY_QUALITIES.contains(&q))
        {
            return None;
        }
        self.allowed(PropertyId::ImageQuality)
            .iter()
            .copied()
            .find(|q| JPEG_ONLY_QUALITIES.contains(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_mode_ids_share_slot() {
        let mut props = CameraPropertySet::new();
        props.update_value(PropertyId::AeModeSelect, 3);
        assert_eq!(props.exposure_mode(), Some(3));
        props.update_value(PropertyId::AeMode, 1);
        assert_eq!(props.value(PropertyId::AeModeSelect), Some(1));
    }

    #[test]
    fn test_routing_bits() {
        let mut props = CameraPropertySet::new();
        assert!(!props.routes_to_host());
        props.update_value(PropertyId::EvfOutputDevice, evf_output::TFT);
        assert!(!props.routes_to_host());
        props.update_value(PropertyId::EvfOutputDevice, evf_output::TFT | evf_output::PC);
        assert!(props.routes_to_host());
    }

    #[test]
    fn test_update_reports_change() {
        let mut props = CameraPropertySet::new();
        assert!(props.update_value(PropertyId::Tv, 0x60));
        assert!(!props.update_value(PropertyId::Tv, 0x60));
        assert!(!props.differs_from(PropertyId::Tv, 0x60));
        assert!(props.differs_from(PropertyId::IsoSpeed, 0));
    }

    #[test]
    fn test_allowed_only_for_enumerated() {
        let mut props = CameraPropertySet::new();
        props.update_allowed(PropertyId::SaveTo, vec![1, 2, 3]);
        assert!(props.allowed(PropertyId::SaveTo).is_empty());
        props.update_allowed(PropertyId::IsoSpeed, vec![0, 0x48, 0x50]);
        assert_eq!(props.allowed(PropertyId::IsoSpeed), &[0, 0x48, 0x50]);
    }

    #[test]
    fn test_jpeg_only_quality_selection() {
        let raw_plus_jpeg = 0x0013_0013;
        let mut props = CameraPropertySet::new();
        props.update_value(PropertyId::ImageQuality, raw_plus_jpeg);
        props.update_allowed(
            PropertyId::ImageQuality,
            vec![raw_plus_jpeg, 0x0013_ff0f, 0x0012_ff0f],
        );
        assert_eq!(props.jpeg_only_quality(), Some(0x0013_ff0f));

        props.update_value(PropertyId::ImageQuality, 0x0012_ff0f);
        assert_eq!(props.jpeg_only_quality(), None);

        let mut raw_only = CameraPropertySet::new();
        raw_only.update_value(PropertyId::ImageQuality, raw_plus_jpeg);
        raw_only.update_allowed(PropertyId::ImageQuality, vec![raw_plus_jpeg]);
        assert_eq!(raw_only.jpeg_only_quality(), None);
    }
}
