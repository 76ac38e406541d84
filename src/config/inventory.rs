//! Inventory documents

use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{read_document, yaml_to_value};
use crate::error::Result;
use crate::inventory::{Host, Inventory};
use crate::transport::{LocalTransport, NoneTransport, Transport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Local,
    None,
}

impl TransportKind {
    fn connect(self) -> Arc<dyn Transport> {
        match self {
            TransportKind::Local => Arc::new(LocalTransport::new()),
            TransportKind::None => Arc::new(NoneTransport),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostDocument {
    pub transport: TransportKind,
    pub escalate_secret: Option<String>,
    pub vars: BTreeMap<String, Yaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryDocument {
    pub hosts: BTreeMap<String, HostDocument>,
    pub groups: BTreeMap<String, Vec<String>>,
}

impl InventoryDocument {
    pub fn build(self) -> Result<Inventory> {
        let mut inventory = Inventory::new();

        for (name, doc) in self.hosts {
            let mut vars = BTreeMap::new();
            for (key, value) in &doc.vars {
                vars.insert(key.clone(), yaml_to_value(value)?);
            }

            let mut host = Host::new(name, doc.transport.connect()).with_vars(vars);
            if let Some(secret) = doc.escalate_secret {
                host = host.with_escalate_secret(secret);
            }
            inventory.add_host(host)?;
        }

        for (name, members) in self.groups {
            inventory.add_group(name, members)?;
        }
        inventory.validate()?;

        debug!(
            "Built inventory with {} host(s) and {} group(s)",
            inventory.hosts().len(),
            inventory.groups().len()
        );
        Ok(inventory)
    }
}

pub fn load_inventory(path: &Path) -> Result<Inventory> {
    read_document::<InventoryDocument>(path)?.build()
}

pub fn parse_inventory(content: &str) -> Result<Inventory> {
    serde_yaml::from_str::<InventoryDocument>(content)?.build()
}
