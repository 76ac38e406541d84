//! Workflow documents

use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::{attribute, read_document, template};
use crate::error::Result;
use crate::expression::Expression;
use crate::inventory::Inventory;
use crate::module::ModuleRegistry;
use crate::workflow::{
    BuildError, EscalateConfig, LoopConfig, OutputConfig, Process, ProcessDefaults, Step,
    Workflow,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalateDocument {
    pub escalate: Option<Yaml>,
    pub impersonate_user: Option<Yaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopDocument {
    pub items: Yaml,
    pub label: Option<Yaml>,
    pub condition: Option<Yaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputDocument {
    pub changed_condition: Option<Yaml>,
    pub failed_condition: Option<Yaml>,
    pub continue_on_fail: Option<Yaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepDocument {
    pub id: String,
    pub name: String,
    pub module: Option<String>,
    pub targets: Option<Vec<String>>,
    pub condition: Option<Yaml>,
    pub exec_timeout: Option<Yaml>,
    pub what_if: Option<bool>,
    pub escalate: Option<EscalateDocument>,
    #[serde(rename = "loop")]
    pub loop_config: Option<LoopDocument>,
    pub input: Option<BTreeMap<String, Yaml>>,
    pub output: Option<OutputDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessDocument {
    pub name: String,
    pub targets: Option<Vec<String>>,
    pub exec_timeout: Option<Yaml>,
    pub what_if: Option<bool>,
    pub escalate: Option<EscalateDocument>,
    #[serde(rename = "loop")]
    pub loop_config: Option<LoopDocument>,
    pub input: Option<BTreeMap<String, Yaml>>,
    pub steps: Vec<StepDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowDocument {
    pub processes: Vec<ProcessDocument>,
}

/// Builds workflow documents against an inventory and a module registry
pub struct WorkflowLoader<'a> {
    registry: &'a ModuleRegistry,
    inventory: &'a Inventory,
}

impl<'a> WorkflowLoader<'a> {
    pub fn new(registry: &'a ModuleRegistry, inventory: &'a Inventory) -> Self {
        Self {
            registry,
            inventory,
        }
    }

    pub fn build(&self, document: WorkflowDocument) -> std::result::Result<Workflow, BuildError> {
        let processes = document
            .processes
            .into_iter()
            .map(|process| self.build_process(process))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!("Loaded workflow with {} process(es)", processes.len());
        Ok(Workflow::new(processes))
    }

    fn build_process(&self, doc: ProcessDocument) -> std::result::Result<Process, BuildError> {
        if doc.name.trim().is_empty() {
            return Err(BuildError::MissingProcessName);
        }
        let context = format!("process `{}`", doc.name);

        let defaults = ProcessDefaults {
            targets: doc
                .targets
                .as_deref()
                .map(|t| self.inventory.resolve_targets(t))
                .transpose()?,
            loop_config: doc
                .loop_config
                .as_ref()
                .map(|l| loop_config(&context, l))
                .transpose()?,
            exec_timeout: doc
                .exec_timeout
                .as_ref()
                .map(|t| template(&format!("{context} exec_timeout"), t))
                .transpose()?,
            what_if: doc.what_if,
            input: doc
                .input
                .as_ref()
                .map(|i| input(&context, i))
                .transpose()?,
            escalate: doc
                .escalate
                .as_ref()
                .map(|e| escalate(&context, e))
                .transpose()?,
        };

        let steps = doc
            .steps
            .into_iter()
            .map(|step| self.build_step(step, &defaults))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Built {} with {} step(s)", context, steps.len());
        Process::new(doc.name, steps)
    }

    fn build_step(
        &self,
        doc: StepDocument,
        defaults: &ProcessDefaults,
    ) -> std::result::Result<Step, BuildError> {
        let context = if doc.id.is_empty() {
            format!("step `{}`", doc.name)
        } else {
            format!("step `{}`", doc.id)
        };

        let mut builder = Step::builder(doc.id.clone(), doc.name.clone());

        if let Some(name) = &doc.module {
            let module = self
                .registry
                .get(name)
                .ok_or_else(|| BuildError::UnknownModule {
                    step: doc.id.clone(),
                    module: name.clone(),
                })?;
            builder = builder.module(module);
        }
        if let Some(targets) = &doc.targets {
            builder = builder.targets(self.inventory.resolve_targets(targets)?);
        }
        if let Some(condition) = &doc.condition {
            builder = builder.condition(attribute(&format!("{context} condition"), condition)?);
        }
        if let Some(l) = &doc.loop_config {
            builder = builder.loop_config(loop_config(&context, l)?);
        }
        if let Some(timeout) = &doc.exec_timeout {
            builder = builder.exec_timeout(template(&format!("{context} exec_timeout"), timeout)?);
        }
        if let Some(what_if) = doc.what_if {
            builder = builder.what_if(what_if);
        }
        if let Some(inputs) = &doc.input {
            for (name, value) in input(&context, inputs)? {
                builder = builder.input(name, value);
            }
        }
        if let Some(e) = &doc.escalate {
            builder = builder.escalate(escalate(&context, e)?);
        }
        if let Some(output) = &doc.output {
            builder = builder.output(output_config(&context, output)?);
        }

        builder.build(defaults)
    }
}

fn optional(
    context: &str,
    field: &str,
    yaml: Option<&Yaml>,
) -> std::result::Result<Option<Expression>, BuildError> {
    yaml.map(|y| attribute(&format!("{context} {field}"), y)).transpose()
}

fn loop_config(context: &str, doc: &LoopDocument) -> std::result::Result<LoopConfig, BuildError> {
    Ok(LoopConfig {
        items: attribute(&format!("{context} loop items"), &doc.items)?,
        label: optional(context, "loop label", doc.label.as_ref())?,
        condition: optional(context, "loop condition", doc.condition.as_ref())?,
    })
}

fn escalate(
    context: &str,
    doc: &EscalateDocument,
) -> std::result::Result<EscalateConfig, BuildError> {
    let config = EscalateConfig {
        escalate: optional(context, "escalate", doc.escalate.as_ref())?,
        impersonate_user: doc
            .impersonate_user
            .as_ref()
            .map(|u| template(&format!("{context} impersonate_user"), u))
            .transpose()?,
    };
    if config.is_empty() {
        return Err(BuildError::EmptyEscalate(context.to_string()));
    }
    Ok(config)
}

fn output_config(
    context: &str,
    doc: &OutputDocument,
) -> std::result::Result<OutputConfig, BuildError> {
    Ok(OutputConfig {
        changed_condition: optional(context, "changed_condition", doc.changed_condition.as_ref())?,
        failed_condition: optional(context, "failed_condition", doc.failed_condition.as_ref())?,
        continue_on_fail: optional(context, "continue_on_fail", doc.continue_on_fail.as_ref())?,
    })
}

fn input(
    context: &str,
    doc: &BTreeMap<String, Yaml>,
) -> std::result::Result<BTreeMap<String, Expression>, BuildError> {
    doc.iter()
        .map(|(name, value)| {
            template(&format!("{context} input `{name}`"), value).map(|e| (name.clone(), e))
        })
        .collect()
}

/// Load and build a workflow file
pub fn load_workflow(
    path: &Path,
    registry: &ModuleRegistry,
    inventory: &Inventory,
) -> Result<Workflow> {
    let document: WorkflowDocument = read_document(path)?;
    Ok(WorkflowLoader::new(registry, inventory).build(document)?)
}

pub fn parse_workflow(
    content: &str,
    registry: &ModuleRegistry,
    inventory: &Inventory,
) -> Result<Workflow> {
    let document: WorkflowDocument = serde_yaml::from_str(content)?;
    Ok(WorkflowLoader::new(registry, inventory).build(document)?)
}
