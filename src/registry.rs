use crate::defaults::default_templates;
use crate::error::{CalculationError, Result};
use crate::schema::{CalculationTemplate, EffectiveTemplate, TemplateStatus};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_MAX_INHERITANCE_DEPTH: usize = 8;

/// A configuration store holding authored templates.
pub trait TemplateStore: Send + Sync {
    /// `Ok(None)` when the store has no template with this id; `Err` when the store itself failed.
    fn fetch(&self, id: &str) -> Result<Option<CalculationTemplate>>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTemplateStore {
    templates: BTreeMap<String, CalculationTemplate>,
}

impl StaticTemplateStore {
    pub fn new(templates: Vec<CalculationTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// The built-in template table.
    pub fn defaults() -> Self {
        Self::new(default_templates())
    }

    /// Loads a JSON array of templates.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let templates: Vec<CalculationTemplate> = serde_json::from_str(json)?;
        Ok(Self::new(templates))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn insert(&mut self, template: CalculationTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateStore for StaticTemplateStore {
    fn fetch(&self, id: &str) -> Result<Option<CalculationTemplate>> {
        Ok(self.templates.get(id).cloned())
    }
}

/// Resolves template ids to effective templates: primary store first, then the static
/// fallback table, folding each `inheritsFrom` chain into a single value.
pub struct TemplateRegistry {
    primary: Option<Box<dyn TemplateStore>>,
    fallback: StaticTemplateStore,
    max_depth: usize,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(StaticTemplateStore::defaults())
    }
}

impl TemplateRegistry {
    pub fn new(fallback: StaticTemplateStore) -> Self {
        Self {
            primary: None,
            fallback,
            max_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
        }
    }

    pub fn with_primary(mut self, store: impl TemplateStore + 'static) -> Self {
        self.primary = Some(Box::new(store));
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Looks up a single authored template without resolving inheritance.
    pub fn fetch_raw(&self, id: &str) -> Result<CalculationTemplate> {
        let from_primary = match &self.primary {
            Some(store) => match store.fetch(id) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Template store failed for '{}', using fallback table: {}", id, e);
                    None
                }
            },
            None => None,
        };

        let template = match from_primary {
            Some(t) => Some(t),
            None => self.fallback.fetch(id)?,
        };

        match template {
            Some(t) if t.status != TemplateStatus::Deleted => Ok(t),
            _ => Err(CalculationError::TemplateNotFound(id.to_string())),
        }
    }

    pub fn get_template(&self, id: &str) -> Result<EffectiveTemplate> {
        let mut chain: Vec<CalculationTemplate> = Vec::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            if chain.iter().any(|t| t.id == current) {
                let mut path: Vec<&str> = chain.iter().map(|t| t.id.as_str()).collect();
                path.push(&current);
                return Err(CalculationError::InheritanceCycle {
                    chain: path.join(" -> "),
                });
            }
            if chain.len() >= self.max_depth {
                return Err(CalculationError::InheritanceTooDeep {
                    id: id.to_string(),
                    depth: self.max_depth,
                });
            }

            let template = self.fetch_raw(&current)?;
            if let Some(parent) = &template.inherits_from {
                debug!("Template '{}' inherits from '{}'", template.id, parent);
            }
            next = template.inherits_from.clone();
            chain.push(template);
        }

        merge_chain(chain)
    }
}

/// Folds a chain ordered most-derived first. Each part comes from the first template that
/// defines it; option lists merge per key with the most-derived definition winning.
fn merge_chain(chain: Vec<CalculationTemplate>) -> Result<EffectiveTemplate> {
    let head = chain
        .first()
        .ok_or_else(|| CalculationError::TemplateNotFound(String::new()))?;

    let formula = chain
        .iter()
        .find_map(|t| t.formula.clone())
        .ok_or_else(|| CalculationError::MissingFormula(head.id.clone()))?;

    let mut system_lists = BTreeMap::new();
    let mut default_custom_lists = BTreeMap::new();
    for template in chain.iter().rev() {
        system_lists.extend(template.system_lists.clone());
        default_custom_lists.extend(template.default_custom_lists.clone());
    }

    Ok(EffectiveTemplate {
        id: head.id.clone(),
        name: head.name.clone(),
        description: head.description.clone(),
        version: head.version.clone(),
        status: head.status,
        lineage: chain.iter().map(|t| t.id.clone()).collect(),
        fields: chain.iter().find_map(|t| t.fields.clone()).unwrap_or_default(),
        cost_fields: chain
            .iter()
            .find_map(|t| t.cost_fields.clone())
            .unwrap_or_default(),
        formula,
        distribution_type: chain
            .iter()
            .find_map(|t| t.distribution_type)
            .unwrap_or_default(),
        has_certainty_percentage: chain
            .iter()
            .find_map(|t| t.has_certainty_percentage)
            .unwrap_or(false),
        has_contract_duration: chain
            .iter()
            .find_map(|t| t.has_contract_duration)
            .unwrap_or(false),
        has_payment_frequency: chain
            .iter()
            .find_map(|t| t.has_payment_frequency)
            .unwrap_or(false),
        system_lists,
        default_custom_lists,
    })
}
