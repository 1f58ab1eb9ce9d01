//! Settings tree seam.
//!
//! Drivers never hold the host's settings widgets directly. They receive an
//! `Arc<dyn SettingsTree>` and address nodes by [`ParamPath`]. The host framework
//! provides its own implementation; [`MemorySettingsTree`] backs the CLI and tests.

use crate::error::{AppResult, DaqError};
use crate::parameter::{ParamDescriptor, ParamLimits, ParamPath, ParamValue};
use parking_lot::RwLock;

/// Grouped, typed, boundable, enable/disable-able settings.
pub trait SettingsTree: Send + Sync {
    /// Append `child` under `parent` (the root when `parent` is empty).
    fn add_child(&self, parent: &ParamPath, child: ParamDescriptor) -> AppResult<()>;

    /// Detach the node at `path` and return it.
    fn remove_child(&self, path: &ParamPath) -> AppResult<ParamDescriptor>;

    /// Snapshot of the node at `path`.
    fn get(&self, path: &ParamPath) -> Option<ParamDescriptor>;

    /// Driver-side value write. Validates type and constraint, ignores read-only.
    fn set_value(&self, path: &ParamPath, value: ParamValue) -> AppResult<()>;

    fn set_enabled(&self, path: &ParamPath, enabled: bool) -> AppResult<()>;

    fn set_limits(&self, path: &ParamPath, limits: ParamLimits) -> AppResult<()>;

    fn value(&self, path: &ParamPath) -> Option<ParamValue> {
        self.get(path).and_then(|p| p.value())
    }

    fn children(&self, path: &ParamPath) -> Vec<ParamDescriptor> {
        self.get(path)
            .map(|p| p.children().to_vec())
            .unwrap_or_default()
    }

    fn contains(&self, path: &ParamPath) -> bool {
        self.get(path).is_some()
    }

    /// Operator edit: rejected on read-only or disabled nodes.
    fn edit_value(&self, path: &ParamPath, value: ParamValue) -> AppResult<()> {
        let node = self
            .get(path)
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        if node.read_only {
            return Err(DaqError::ParameterReadOnly);
        }
        if !node.enabled {
            return Err(DaqError::InvalidState(format!(
                "'{}' is disabled while acquiring",
                path
            )));
        }
        self.set_value(path, value)
    }
}

/// In-process settings tree.
#[derive(Default)]
pub struct MemorySettingsTree {
    root: RwLock<Vec<ParamDescriptor>>,
}

impl MemorySettingsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree pre-populated with top-level nodes.
    pub fn with_children(children: Vec<ParamDescriptor>) -> Self {
        Self {
            root: RwLock::new(children),
        }
    }

    /// Full snapshot, serialisable for hosts that mirror the tree.
    pub fn snapshot(&self) -> Vec<ParamDescriptor> {
        self.root.read().clone()
    }

    fn with_node<R>(
        &self,
        path: &ParamPath,
        f: impl FnOnce(&mut ParamDescriptor) -> AppResult<R>,
    ) -> AppResult<R> {
        let mut root = self.root.write();
        let node = find_mut(&mut root, path.keys())
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        f(node)
    }
}

fn find<'a>(nodes: &'a [ParamDescriptor], keys: &[String]) -> Option<&'a ParamDescriptor> {
    let (first, rest) = keys.split_first()?;
    let node = nodes.iter().find(|n| n.name == *first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find(node.children(), rest)
    }
}

fn find_mut<'a>(
    nodes: &'a mut [ParamDescriptor],
    keys: &[String],
) -> Option<&'a mut ParamDescriptor> {
    let (first, rest) = keys.split_first()?;
    let node = nodes.iter_mut().find(|n| n.name == *first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find_mut(node.children_mut()?, rest)
    }
}

impl SettingsTree for MemorySettingsTree {
    fn add_child(&self, parent: &ParamPath, child: ParamDescriptor) -> AppResult<()> {
        let mut root = self.root.write();
        let siblings = if parent.is_root() {
            &mut *root
        } else {
            find_mut(&mut root, parent.keys())
                .ok_or_else(|| DaqError::ParameterNotFound(parent.to_string()))?
                .children_mut()
                .ok_or_else(|| DaqError::ParameterTypeMismatch {
                    path: parent.to_string(),
                    expected: "group",
                    actual: "leaf",
                })?
        };
        if siblings.iter().any(|s| s.name == child.name) {
            return Err(DaqError::ParameterExists(parent.child(child.name).to_string()));
        }
        siblings.push(child);
        Ok(())
    }

    fn remove_child(&self, path: &ParamPath) -> AppResult<ParamDescriptor> {
        let name = path
            .name()
            .ok_or_else(|| DaqError::ParameterNotFound(String::new()))?;
        let mut root = self.root.write();
        let siblings = match path.parent() {
            Some(parent) if !parent.is_root() => find_mut(&mut root, parent.keys())
                .and_then(|p| p.children_mut())
                .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?,
            _ => &mut *root,
        };
        let index = siblings
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| DaqError::ParameterNotFound(path.to_string()))?;
        Ok(siblings.remove(index))
    }

    fn get(&self, path: &ParamPath) -> Option<ParamDescriptor> {
        let root = self.root.read();
        find(&root, path.keys()).cloned()
    }

    fn set_value(&self, path: &ParamPath, value: ParamValue) -> AppResult<()> {
        self.with_node(path, |node| node.set_value(value))
    }

    fn set_enabled(&self, path: &ParamPath, enabled: bool) -> AppResult<()> {
        self.with_node(path, |node| {
            node.enabled = enabled;
            Ok(())
        })
    }

    fn set_limits(&self, path: &ParamPath, limits: ParamLimits) -> AppResult<()> {
        self.with_node(path, |node| node.set_limits(limits))
    }
}
