//! ROI sub-tree
//!
//! A ROI attribute is exposed as a group of six integer fields. The group's key is
//! the normalised attribute name (`rois`).

use daq_core::core::Roi;
use daq_core::error::{AppResult, DaqError};
use daq_core::parameter::{ParamDescriptor, ParamPath, ParamValue};
use daq_core::settings::SettingsTree;

/// Key of the ROI group inside the settable group.
pub const ROI_GROUP: &str = "rois";

/// Field keys, in display order.
pub const ROI_FIELDS: [&str; 6] = ["x", "y", "width", "height", "x_binning", "y_binning"];

const MAX_COORD: i64 = u32::MAX as i64;

fn field_values(roi: &Roi) -> [u32; 6] {
    [
        roi.x,
        roi.y,
        roi.width,
        roi.height,
        roi.x_binning,
        roi.y_binning,
    ]
}

/// Six integer descriptors, one per ROI field.
pub fn roi_children(roi: &Roi, read_only: bool) -> Vec<ParamDescriptor> {
    ROI_FIELDS
        .iter()
        .zip(field_values(roi))
        .map(|(field, value)| {
            let min = if field.ends_with("binning") { 1 } else { 0 };
            ParamDescriptor::int(*field, i64::from(value), Some((min, MAX_COORD)))
                .with_read_only(read_only)
        })
        .collect()
}

fn field(children: &[ParamDescriptor], name: &str) -> AppResult<u32> {
    let value = children
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| c.value())
        .ok_or_else(|| DaqError::ParameterNotFound(format!("{}/{}", ROI_GROUP, name)))?;
    let raw = value.as_i64().ok_or(DaqError::ParameterTypeMismatch {
        path: format!("{}/{}", ROI_GROUP, name),
        expected: "int",
        actual: value.type_name(),
    })?;
    u32::try_from(raw).map_err(|_| DaqError::ParameterOutOfRange {
        path: format!("{}/{}", ROI_GROUP, name),
        value: raw as f64,
        min: 0.0,
        max: MAX_COORD as f64,
    })
}

/// Candidate ROI from the six field descriptors.
pub fn roi_from_children(children: &[ParamDescriptor]) -> AppResult<Roi> {
    Ok(Roi {
        x: field(children, "x")?,
        y: field(children, "y")?,
        width: field(children, "width")?,
        height: field(children, "height")?,
        x_binning: field(children, "x_binning")?,
        y_binning: field(children, "y_binning")?,
    })
}

/// Read the ROI currently held by the tree group at `group`.
pub fn read_roi(tree: &dyn SettingsTree, group: &ParamPath) -> AppResult<Roi> {
    let node = tree
        .get(group)
        .ok_or_else(|| DaqError::ParameterNotFound(group.to_string()))?;
    roi_from_children(node.children())
}

/// Write `roi` into the group's fields. Returns whether any field changed.
pub fn write_roi(tree: &dyn SettingsTree, group: &ParamPath, roi: &Roi) -> AppResult<bool> {
    let mut changed = false;
    for (name, value) in ROI_FIELDS.iter().zip(field_values(roi)) {
        let path = group.child(*name);
        let value = ParamValue::Int(i64::from(value));
        if tree.value(&path).as_ref() != Some(&value) {
            tree.set_value(&path, value)?;
            changed = true;
        }
    }
    Ok(changed)
}
