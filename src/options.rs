use crate::error::Result;
use crate::schema::{EffectiveTemplate, OptionList};
use log::warn;
use std::collections::BTreeMap;

/// Tenant/product configuration collaborator for select-field option lists.
pub trait OptionListStore: Send + Sync {
    fn tenant_list(&self, tenant_id: &str, list_key: &str) -> Result<Option<OptionList>>;

    fn product_list(&self, product_id: &str, list_key: &str) -> Result<Option<OptionList>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOptionStore {
    tenant_lists: BTreeMap<(String, String), OptionList>,
    product_lists: BTreeMap<(String, String), OptionList>,
}

impl InMemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tenant_list(&mut self, tenant_id: &str, list_key: &str, list: OptionList) {
        self.tenant_lists
            .insert((tenant_id.to_string(), list_key.to_string()), list);
    }

    pub fn set_product_list(&mut self, product_id: &str, list_key: &str, list: OptionList) {
        self.product_lists
            .insert((product_id.to_string(), list_key.to_string()), list);
    }
}

impl OptionListStore for InMemoryOptionStore {
    fn tenant_list(&self, tenant_id: &str, list_key: &str) -> Result<Option<OptionList>> {
        Ok(self
            .tenant_lists
            .get(&(tenant_id.to_string(), list_key.to_string()))
            .cloned())
    }

    fn product_list(&self, product_id: &str, list_key: &str) -> Result<Option<OptionList>> {
        Ok(self
            .product_lists
            .get(&(product_id.to_string(), list_key.to_string()))
            .cloned())
    }
}

/// Where an effective option list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionListSource {
    Tenant,
    Product,
    TemplateDefault,
    System,
    Empty,
}

/// System lists are fixed and answered without consulting the store. Other keys resolve
/// most specific first: tenant override, product list, the template's default custom list,
/// then nothing. A failing store level is skipped.
pub fn resolve_option_list(
    store: &dyn OptionListStore,
    tenant_id: &str,
    product_id: &str,
    list_key: &str,
    template: &EffectiveTemplate,
) -> (OptionList, OptionListSource) {
    if let Some(list) = template.system_lists.get(list_key) {
        return (list.clone(), OptionListSource::System);
    }

    match store.tenant_list(tenant_id, list_key) {
        Ok(Some(list)) => return (list, OptionListSource::Tenant),
        Ok(None) => {}
        Err(e) => warn!("Tenant list '{}' unavailable for {}: {}", list_key, tenant_id, e),
    }

    match store.product_list(product_id, list_key) {
        Ok(Some(list)) => return (list, OptionListSource::Product),
        Ok(None) => {}
        Err(e) => warn!("Product list '{}' unavailable for {}: {}", list_key, product_id, e),
    }

    if let Some(list) = template.default_custom_lists.get(list_key) {
        return (list.clone(), OptionListSource::TemplateDefault);
    }
    (Vec::new(), OptionListSource::Empty)
}

pub fn get_effective_option_list(
    store: &dyn OptionListStore,
    tenant_id: &str,
    product_id: &str,
    list_key: &str,
    template: &EffectiveTemplate,
) -> OptionList {
    resolve_option_list(store, tenant_id, product_id, list_key, template).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalculationError;
    use crate::registry::TemplateRegistry;
    use crate::schema::OptionItem;

    fn list(ids: &[&str]) -> OptionList {
        ids.iter()
            .map(|id| OptionItem {
                id: id.to_string(),
                name: id.to_uppercase(),
                value: (*id).into(),
            })
            .collect()
    }

    struct BrokenStore;

    impl OptionListStore for BrokenStore {
        fn tenant_list(&self, _: &str, _: &str) -> Result<Option<OptionList>> {
            Err(CalculationError::StoreError("timeout".to_string()))
        }

        fn product_list(&self, _: &str, _: &str) -> Result<Option<OptionList>> {
            Err(CalculationError::StoreError("timeout".to_string()))
        }
    }

    #[test]
    fn test_resolution_order() {
        let template = TemplateRegistry::default()
            .get_template("learnership")
            .unwrap();
        let mut store = InMemoryOptionStore::new();

        let (defaults, source) =
            resolve_option_list(&store, "acme", "prod-1", "qualifications", &template);
        assert_eq!(source, OptionListSource::TemplateDefault);
        assert_eq!(defaults.len(), 4);

        store.set_product_list("prod-1", "qualifications", list(&["nqf6"]));
        let (product, source) =
            resolve_option_list(&store, "acme", "prod-1", "qualifications", &template);
        assert_eq!(source, OptionListSource::Product);
        assert_eq!(product[0].id, "nqf6");

        store.set_tenant_list("acme", "qualifications", list(&["acme-custom"]));
        let (tenant, source) =
            resolve_option_list(&store, "acme", "prod-1", "qualifications", &template);
        assert_eq!(source, OptionListSource::Tenant);
        assert_eq!(tenant[0].id, "acme-custom");

        // Other tenants still see the product list
        let other = get_effective_option_list(&store, "globex", "prod-1", "qualifications", &template);
        assert_eq!(other[0].id, "nqf6");
    }

    #[test]
    fn test_system_list_and_empty_fallback() {
        let template = TemplateRegistry::default()
            .get_template("training-workshop")
            .unwrap();
        let store = InMemoryOptionStore::new();

        let (modes, source) =
            resolve_option_list(&store, "acme", "prod-1", "deliveryModes", &template);
        assert_eq!(source, OptionListSource::System);
        assert_eq!(modes.len(), 3);

        let (missing, source) = resolve_option_list(&store, "acme", "prod-1", "nothing", &template);
        assert_eq!(source, OptionListSource::Empty);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_system_lists_ignore_overrides() {
        let template = TemplateRegistry::default()
            .get_template("training-workshop")
            .unwrap();
        let mut store = InMemoryOptionStore::new();
        store.set_tenant_list("acme", "deliveryModes", list(&["x"]));
        store.set_product_list("prod-1", "deliveryModes", list(&["y"]));

        let (modes, source) =
            resolve_option_list(&store, "acme", "prod-1", "deliveryModes", &template);
        assert_eq!(source, OptionListSource::System);
        assert_eq!(modes.len(), 3);
        assert!(modes.iter().all(|m| m.id != "x" && m.id != "y"));

        // System lists never touch the store, even a failing one
        let (modes, source) =
            resolve_option_list(&BrokenStore, "acme", "prod-1", "deliveryModes", &template);
        assert_eq!(source, OptionListSource::System);
        assert_eq!(modes.len(), 3);
    }

    #[test]
    fn test_broken_store_falls_through_to_template() {
        let template = TemplateRegistry::default()
            .get_template("learnership")
            .unwrap();
        let (lists, source) =
            resolve_option_list(&BrokenStore, "acme", "prod-1", "qualifications", &template);
        assert_eq!(source, OptionListSource::TemplateDefault);
        assert_eq!(lists.len(), 4);
    }
}
