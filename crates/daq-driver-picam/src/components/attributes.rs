//! Attribute translation
//!
//! Maps vendor [`CameraAttribute`]s to [`ParamDescriptor`]s and converts values
//! in both directions.
//!
//! ## Mapping rules
//!
//! | Vendor kind                         | Labels    | Descriptor                                  |
//! |-------------------------------------|-----------|---------------------------------------------|
//! | Integer / Large Integer / Float     | non-empty | `List` of label display strings             |
//! | Integer / Large Integer             | none      | `Int`, bounded only by a permanent range    |
//! | Floating Point                      | none      | `Float`, bounded only by a permanent range  |
//! | Boolean                             | n/a       | `Bool`                                      |
//! | Enumeration                         | n/a       | `List` of label keys                        |
//! | ROIs                                | n/a       | `Group` of six `Int` fields from ROI 0      |
//! | anything else                       |           | [`DaqError::UnsupportedAttribute`]          |
//!
//! Keys are [`normalise_name`] of the vendor name. Collisions are reported with a
//! warning but not resolved; the second attribute still lands in the list.

use crate::components::roi;
use crate::config::UnsupportedPolicy;
use crate::sdk::{AttributeKind, AttributeValue, CameraAttribute};
use daq_core::error::{AppResult, DaqError};
use daq_core::parameter::{normalise_name, ParamDescriptor, ParamKind, ParamLimits, ParamValue};
use std::collections::HashMap;

fn has_labels(attr: &CameraAttribute) -> bool {
    !attr.labels.is_empty()
}

/// Allowed values and current value of a list-classified attribute.
///
/// The current value is appended when the camera reports one outside its own labels,
/// so the descriptor invariant (value is a member) always holds.
fn list_choices(attr: &CameraAttribute) -> (String, Vec<String>) {
    let key = attr.value.label_key();
    let (value, mut choices) = if attr.kind == AttributeKind::Enumeration {
        (key, attr.labels.iter().map(|l| l.key.clone()).collect::<Vec<_>>())
    } else {
        let display = attr
            .labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.display.clone())
            .unwrap_or(key);
        (
            display,
            attr.labels.iter().map(|l| l.display.clone()).collect(),
        )
    };
    if !choices.contains(&value) {
        tracing::debug!(attribute = %attr.name, value = %value, "current value not among labels");
        choices.push(value.clone());
    }
    (value, choices)
}

fn is_list(attr: &CameraAttribute) -> bool {
    attr.kind == AttributeKind::Enumeration || (attr.kind.is_numeric() && has_labels(attr))
}

fn int_range(attr: &CameraAttribute) -> Option<(i64, i64)> {
    attr.permanent_range()
        .map(|(min, max)| (min.ceil() as i64, max.floor() as i64))
}

fn unsupported(attr: &CameraAttribute) -> DaqError {
    DaqError::UnsupportedAttribute {
        name: attr.name.clone(),
        kind: attr.kind.to_string(),
    }
}

fn value_mismatch(attr: &CameraAttribute) -> DaqError {
    DaqError::Instrument(format!(
        "attribute '{}' of kind {} reported value {:?}",
        attr.name, attr.kind, attr.value
    ))
}

/// Translate one attribute, or report that its kind is not representable.
pub fn translate(attr: &CameraAttribute) -> AppResult<ParamDescriptor> {
    let kind = if is_list(attr) {
        let (value, limits) = list_choices(attr);
        ParamKind::List { value, limits }
    } else {
        match (attr.kind, &attr.value) {
            (AttributeKind::Integer | AttributeKind::LargeInteger, AttributeValue::Int(v)) => {
                ParamKind::Int {
                    value: *v,
                    limits: int_range(attr),
                }
            }
            (AttributeKind::FloatingPoint, AttributeValue::Float(v)) => ParamKind::Float {
                value: *v,
                limits: attr.permanent_range(),
            },
            (AttributeKind::FloatingPoint, AttributeValue::Int(v)) => ParamKind::Float {
                value: *v as f64,
                limits: attr.permanent_range(),
            },
            (AttributeKind::Boolean, AttributeValue::Bool(v)) => ParamKind::Bool { value: *v },
            (AttributeKind::Rois, AttributeValue::Rois(rois)) => {
                let first = rois.first().ok_or_else(|| {
                    DaqError::Instrument(format!("attribute '{}' holds no ROI", attr.name))
                })?;
                ParamKind::Group {
                    children: roi::roi_children(first, !attr.writable),
                }
            }
            (AttributeKind::Pulse | AttributeKind::Modulations, _) => {
                return Err(unsupported(attr))
            }
            _ => return Err(value_mismatch(attr)),
        }
    };
    Ok(ParamDescriptor {
        title: attr.name.clone(),
        name: normalise_name(&attr.name),
        kind,
        read_only: !attr.writable,
        enabled: true,
    })
}

/// Translate a whole attribute list under one policy.
///
/// Unsupported attributes listed in `hidden` are always dropped, so hiding one is
/// enough to initialise a camera that exposes it.
pub fn translate_all(
    attrs: &[CameraAttribute],
    policy: UnsupportedPolicy,
    hidden: &[String],
) -> AppResult<Vec<ParamDescriptor>> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut out = Vec::with_capacity(attrs.len());
    for attr in attrs {
        let descriptor = match translate(attr) {
            Ok(d) => d,
            Err(DaqError::UnsupportedAttribute { name, kind })
                if policy == UnsupportedPolicy::Skip || hidden.contains(&name) =>
            {
                tracing::warn!(attribute = %name, kind = %kind, "skipping unsupported attribute");
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(previous) = seen.insert(descriptor.name.clone(), attr.name.clone()) {
            tracing::warn!(
                key = %descriptor.name,
                first = %previous,
                second = %attr.name,
                "attribute names collide after normalisation"
            );
        }
        tracing::debug!(attribute = %attr.name, kind = descriptor.kind.type_name(), "translated");
        out.push(descriptor);
    }
    Ok(out)
}

/// Tree value for the attribute's current vendor value. `None` for groups.
pub fn to_param_value(attr: &CameraAttribute) -> Option<ParamValue> {
    if is_list(attr) {
        return Some(ParamValue::Str(list_choices(attr).0));
    }
    match &attr.value {
        AttributeValue::Int(v) if attr.kind == AttributeKind::FloatingPoint => {
            Some(ParamValue::Float(*v as f64))
        }
        AttributeValue::Int(v) => Some(ParamValue::Int(*v)),
        AttributeValue::Float(v) => Some(ParamValue::Float(*v)),
        AttributeValue::Bool(v) => Some(ParamValue::Bool(*v)),
        AttributeValue::Enum(v) | AttributeValue::Opaque(v) => Some(ParamValue::Str(v.clone())),
        AttributeValue::Rois(_) => None,
    }
}

/// Current constraint of the attribute in tree form.
pub fn to_param_limits(attr: &CameraAttribute) -> Option<ParamLimits> {
    if is_list(attr) {
        return Some(ParamLimits::Choices(list_choices(attr).1));
    }
    match attr.kind {
        AttributeKind::Integer | AttributeKind::LargeInteger => {
            Some(ParamLimits::Int(int_range(attr)))
        }
        AttributeKind::FloatingPoint => Some(ParamLimits::Float(attr.permanent_range())),
        _ => None,
    }
}

/// Vendor value for a tree value, resolving list display strings to label keys.
pub fn to_attribute_value(attr: &CameraAttribute, value: &ParamValue) -> AppResult<AttributeValue> {
    let mismatch = |expected: &'static str| DaqError::ParameterTypeMismatch {
        path: normalise_name(&attr.name),
        expected,
        actual: value.type_name(),
    };
    if attr.kind == AttributeKind::Enumeration {
        let key = value.as_str().ok_or_else(|| mismatch("str"))?;
        return Ok(AttributeValue::Enum(key.to_string()));
    }
    if is_list(attr) {
        let display = value.as_str().ok_or_else(|| mismatch("str"))?;
        let key = attr
            .labels
            .iter()
            .find(|l| l.display == display)
            .map(|l| l.key.as_str())
            .ok_or_else(|| DaqError::ParameterInvalidChoice {
                path: normalise_name(&attr.name),
                value: display.to_string(),
            })?;
        return parse_numeric_key(attr, key);
    }
    match attr.kind {
        AttributeKind::Integer | AttributeKind::LargeInteger => value
            .as_i64()
            .map(AttributeValue::Int)
            .ok_or_else(|| mismatch("int")),
        AttributeKind::FloatingPoint => value
            .as_f64()
            .map(AttributeValue::Float)
            .ok_or_else(|| mismatch("float")),
        AttributeKind::Boolean => value
            .as_bool()
            .map(AttributeValue::Bool)
            .ok_or_else(|| mismatch("bool")),
        _ => Err(unsupported(attr)),
    }
}

fn parse_numeric_key(attr: &CameraAttribute, key: &str) -> AppResult<AttributeValue> {
    let parsed = match attr.kind {
        AttributeKind::FloatingPoint => key.parse::<f64>().ok().map(AttributeValue::Float),
        _ => key.parse::<i64>().ok().map(AttributeValue::Int),
    };
    parsed.ok_or_else(|| {
        DaqError::Instrument(format!(
            "label key '{}' of '{}' is not a {} value",
            key, attr.name, attr.kind
        ))
    })
}
