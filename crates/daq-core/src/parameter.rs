//! Settings descriptors (tagged-variant parameter model)
//!
//! A [`ParamDescriptor`] is the host-agnostic description of one settings-tree node.
//! Its [`ParamKind`] variant carries the payload, so the kind alone decides whether a
//! range, an allowed-value list or a list of children applies:
//!
//! | Kind    | Value    | Constraint                  |
//! |---------|----------|-----------------------------|
//! | `Int`   | `i64`    | optional `[min, max]`       |
//! | `Float` | `f64`    | optional `[min, max]`       |
//! | `Bool`  | `bool`   | none                        |
//! | `List`  | `String` | allowed values              |
//! | `Str`   | `String` | none                        |
//! | `Group` | none     | ordered child descriptors   |
//!
//! ```rust
//! use daq_core::parameter::{ParamDescriptor, ParamValue};
//!
//! let mut exposure = ParamDescriptor::float("Exposure Time", 100.0, Some((0.0, 1e6)));
//! assert_eq!(exposure.name, "exposure_time");
//! exposure.set_value(ParamValue::Int(250)).unwrap();
//! assert_eq!(exposure.value(), Some(ParamValue::Float(250.0)));
//! ```

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Normalised settings key: spaces become underscores, then lower-cased.
///
/// Two titles can normalise to the same key; callers that build groups from vendor
/// names are responsible for noticing.
pub fn normalise_name(title: &str) -> String {
    title.replace(' ', "_").to_lowercase()
}

/// Ordered key path from the tree root to one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ParamPath(Vec<String>);

impl ParamPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    pub fn parent(&self) -> Option<ParamPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Key of the addressed node.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Key of the addressed node's parent.
    pub fn parent_name(&self) -> Option<&str> {
        self.0.len().checked_sub(2).map(|i| self.0[i].as_str())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ParamPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A value carried by a leaf node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
            ParamValue::Str(_) => "str",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

/// Replacement constraint for [`ParamDescriptor::set_limits`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamLimits {
    Int(Option<(i64, i64)>),
    Float(Option<(f64, f64)>),
    Choices(Vec<String>),
}

/// Node kind with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Int {
        value: i64,
        limits: Option<(i64, i64)>,
    },
    Float {
        value: f64,
        limits: Option<(f64, f64)>,
    },
    Bool {
        value: bool,
    },
    List {
        value: String,
        limits: Vec<String>,
    },
    Str {
        value: String,
    },
    Group {
        children: Vec<ParamDescriptor>,
    },
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Int { .. } => "int",
            ParamKind::Float { .. } => "float",
            ParamKind::Bool { .. } => "bool",
            ParamKind::List { .. } => "list",
            ParamKind::Str { .. } => "str",
            ParamKind::Group { .. } => "group",
        }
    }
}

/// One settings-tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Display name, verbatim from the source (vendor attribute name, field name).
    pub title: String,
    /// Normalised key used in paths.
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ParamDescriptor {
    /// Descriptor keyed by [`normalise_name`] of its title.
    pub fn new(title: impl Into<String>, kind: ParamKind) -> Self {
        let title = title.into();
        let name = normalise_name(&title);
        Self {
            title,
            name,
            kind,
            read_only: false,
            enabled: true,
        }
    }

    pub fn int(title: impl Into<String>, value: i64, limits: Option<(i64, i64)>) -> Self {
        Self::new(title, ParamKind::Int { value, limits })
    }

    pub fn float(title: impl Into<String>, value: f64, limits: Option<(f64, f64)>) -> Self {
        Self::new(title, ParamKind::Float { value, limits })
    }

    pub fn boolean(title: impl Into<String>, value: bool) -> Self {
        Self::new(title, ParamKind::Bool { value })
    }

    pub fn list(title: impl Into<String>, value: impl Into<String>, limits: Vec<String>) -> Self {
        Self::new(
            title,
            ParamKind::List {
                value: value.into(),
                limits,
            },
        )
    }

    pub fn string(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            title,
            ParamKind::Str {
                value: value.into(),
            },
        )
    }

    pub fn group(title: impl Into<String>, children: Vec<ParamDescriptor>) -> Self {
        Self::new(title, ParamKind::Group { children })
    }

    /// Override the key (for titles that are not meant to be normalised).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ParamKind::Group { .. })
    }

    /// Current value; `None` for groups.
    pub fn value(&self) -> Option<ParamValue> {
        match &self.kind {
            ParamKind::Int { value, .. } => Some(ParamValue::Int(*value)),
            ParamKind::Float { value, .. } => Some(ParamValue::Float(*value)),
            ParamKind::Bool { value } => Some(ParamValue::Bool(*value)),
            ParamKind::List { value, .. } | ParamKind::Str { value } => {
                Some(ParamValue::Str(value.clone()))
            }
            ParamKind::Group { .. } => None,
        }
    }

    pub fn children(&self) -> &[ParamDescriptor] {
        match &self.kind {
            ParamKind::Group { children } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ParamDescriptor>> {
        match &mut self.kind {
            ParamKind::Group { children } => Some(children),
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&ParamDescriptor> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Type-checked, constraint-checked value update.
    ///
    /// Integers are accepted into float nodes. Read-only is not enforced here; it
    /// guards operator edits, not driver writes.
    pub fn set_value(&mut self, new_value: ParamValue) -> AppResult<()> {
        let path = self.name.clone();
        match (&mut self.kind, new_value) {
            (ParamKind::Int { value, limits }, ParamValue::Int(v)) => {
                if let Some((min, max)) = *limits {
                    if v < min || v > max {
                        return Err(DaqError::ParameterOutOfRange {
                            path,
                            value: v as f64,
                            min: min as f64,
                            max: max as f64,
                        });
                    }
                }
                *value = v;
            }
            (ParamKind::Float { value, limits }, v @ (ParamValue::Float(_) | ParamValue::Int(_))) => {
                let v = v.as_f64().unwrap_or(f64::NAN);
                if !v.is_finite() {
                    return Err(DaqError::ParameterTypeMismatch {
                        path,
                        expected: "finite float",
                        actual: "non-finite float",
                    });
                }
                if let Some((min, max)) = *limits {
                    if v < min || v > max {
                        return Err(DaqError::ParameterOutOfRange {
                            path,
                            value: v,
                            min,
                            max,
                        });
                    }
                }
                *value = v;
            }
            (ParamKind::Bool { value }, ParamValue::Bool(v)) => *value = v,
            (ParamKind::List { value, limits }, ParamValue::Str(v)) => {
                if !limits.iter().any(|choice| *choice == v) {
                    return Err(DaqError::ParameterInvalidChoice { path, value: v });
                }
                *value = v;
            }
            (ParamKind::Str { value }, ParamValue::Str(v)) => *value = v,
            (kind, v) => {
                let expected = match kind {
                    ParamKind::Group { .. } => "leaf",
                    other => other.type_name(),
                };
                return Err(DaqError::ParameterTypeMismatch {
                    path,
                    expected,
                    actual: v.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Replace the constraint of a numeric or list node.
    ///
    /// The current value is left untouched even if it now falls outside.
    pub fn set_limits(&mut self, new_limits: ParamLimits) -> AppResult<()> {
        match (&mut self.kind, new_limits) {
            (ParamKind::Int { limits, .. }, ParamLimits::Int(l)) => *limits = l,
            (ParamKind::Float { limits, .. }, ParamLimits::Float(l)) => *limits = l,
            (ParamKind::List { limits, .. }, ParamLimits::Choices(l)) => *limits = l,
            (kind, _) => {
                return Err(DaqError::ParameterTypeMismatch {
                    path: self.name.clone(),
                    expected: kind.type_name(),
                    actual: "limits",
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_lowercase_with_underscores() {
        assert_eq!(normalise_name("ADC Analog Gain"), "adc_analog_gain");
        assert_eq!(normalise_name("ROIs"), "rois");
    }

    #[test]
    fn path_helpers() {
        let path = ParamPath::new(["settable_camera_parameters", "rois", "x"]);
        assert_eq!(path.name(), Some("x"));
        assert_eq!(path.parent_name(), Some("rois"));
        assert_eq!(path.to_string(), "settable_camera_parameters/rois/x");
        assert_eq!(
            path.parent(),
            Some(ParamPath::new(["settable_camera_parameters", "rois"]))
        );
        assert_eq!(ParamPath::root().parent_name(), None);
    }

    #[test]
    fn int_limits_are_enforced() {
        let mut p = ParamDescriptor::int("Width", 10, Some((1, 100)));
        assert!(p.set_value(ParamValue::Int(100)).is_ok());
        assert!(matches!(
            p.set_value(ParamValue::Int(101)),
            Err(DaqError::ParameterOutOfRange { .. })
        ));
        assert_eq!(p.value(), Some(ParamValue::Int(100)));
    }

    #[test]
    fn list_rejects_unknown_choice() {
        let mut p = ParamDescriptor::list("ADC Quality", "Low Noise", vec!["Low Noise".into()]);
        let err = p.set_value(ParamValue::Str("Turbo".into())).unwrap_err();
        assert!(matches!(err, DaqError::ParameterInvalidChoice { .. }));
    }

    #[test]
    fn group_has_no_value() {
        let mut g = ParamDescriptor::group("ROIs", vec![ParamDescriptor::int("x", 0, None)]);
        assert_eq!(g.value(), None);
        assert!(g.child("x").is_some());
        assert!(g.set_value(ParamValue::Int(1)).is_err());
    }

    #[test]
    fn limits_must_match_kind() {
        let mut p = ParamDescriptor::boolean("Shutter", false);
        assert!(p.set_limits(ParamLimits::Int(None)).is_err());
        let mut f = ParamDescriptor::float("Exposure Time", 1.0, None);
        f.set_limits(ParamLimits::Float(Some((0.0, 2.0)))).unwrap();
        assert!(f.set_value(ParamValue::Float(3.0)).is_err());
    }

    #[test]
    fn descriptor_serialises_with_type_tag() {
        let p = ParamDescriptor::int("Exposure Time", 5, None);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "int");
        assert_eq!(json["name"], "exposure_time");
        let back: ParamDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
