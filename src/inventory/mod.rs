//! Host inventory
//!
//! Hosts are addressed by name or through groups. Targets are resolved when a
//! workflow is built, so execution only ever sees concrete host lists.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

mod host;

pub use host::{Host, HostState};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("host `{0}` is defined more than once")]
    DuplicateHost(String),

    #[error("`{0}` is defined as both a host and a group")]
    AmbiguousName(String),

    #[error("group `{group}` references unknown member `{member}`")]
    UnknownMember { group: String, member: String },

    #[error("group `{0}` contains itself")]
    GroupCycle(String),

    #[error("unknown host or group `{0}`")]
    UnknownTarget(String),
}

/// All known hosts plus named groups of hosts and groups
#[derive(Debug, Default)]
pub struct Inventory {
    hosts: Vec<Arc<Host>>,
    groups: BTreeMap<String, Vec<String>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&mut self, host: Host) -> Result<(), InventoryError> {
        if self.host(host.name()).is_some() {
            return Err(InventoryError::DuplicateHost(host.name().to_string()));
        }
        if self.groups.contains_key(host.name()) {
            return Err(InventoryError::AmbiguousName(host.name().to_string()));
        }
        self.hosts.push(Arc::new(host));
        Ok(())
    }

    /// Add a group; members may be hosts or other groups
    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        members: Vec<String>,
    ) -> Result<(), InventoryError> {
        let name = name.into();
        if self.host(&name).is_some() {
            return Err(InventoryError::AmbiguousName(name));
        }
        self.groups.insert(name, members);
        Ok(())
    }

    /// Check every group member exists and no group contains itself
    pub fn validate(&self) -> Result<(), InventoryError> {
        for group in self.groups.keys() {
            let mut path = Vec::new();
            self.check_group(group, &mut path)?;
        }
        Ok(())
    }

    fn check_group<'a>(
        &'a self,
        group: &'a str,
        path: &mut Vec<&'a str>,
    ) -> Result<(), InventoryError> {
        if path.contains(&group) {
            return Err(InventoryError::GroupCycle(group.to_string()));
        }
        path.push(group);
        for member in self.groups.get(group).into_iter().flatten() {
            if self.groups.contains_key(member) {
                self.check_group(member, path)?;
            } else if self.host(member).is_none() {
                return Err(InventoryError::UnknownMember {
                    group: group.to_string(),
                    member: member.clone(),
                });
            }
        }
        path.pop();
        Ok(())
    }

    pub fn host(&self, name: &str) -> Option<&Arc<Host>> {
        self.hosts.iter().find(|h| h.name() == name)
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    /// Resolve host and group names to a deduplicated host list
    ///
    /// Hosts keep the order in which they are first reached.
    pub fn resolve_targets(&self, targets: &[String]) -> Result<Vec<Arc<Host>>, InventoryError> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();
        for target in targets {
            self.resolve_into(target, &mut seen, &mut resolved, 0)?;
        }
        debug!(
            "Resolved targets {:?} to {} host(s)",
            targets,
            resolved.len()
        );
        Ok(resolved)
    }

    fn resolve_into(
        &self,
        name: &str,
        seen: &mut BTreeSet<String>,
        resolved: &mut Vec<Arc<Host>>,
        depth: usize,
    ) -> Result<(), InventoryError> {
        if depth > self.groups.len() {
            return Err(InventoryError::GroupCycle(name.to_string()));
        }
        if let Some(host) = self.host(name) {
            if seen.insert(host.name().to_string()) {
                resolved.push(Arc::clone(host));
            }
            return Ok(());
        }
        let members = self
            .groups
            .get(name)
            .ok_or_else(|| InventoryError::UnknownTarget(name.to_string()))?;
        for member in members {
            self.resolve_into(member, seen, resolved, depth + 1)?;
        }
        Ok(())
    }
}
