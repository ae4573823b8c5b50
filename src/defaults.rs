//! Built-in templates served when the configuration store has nothing for an id.

use crate::schema::*;
use std::collections::BTreeMap;

const ALL_FREQUENCIES: [&str; 4] = ["once-off", "monthly", "with-income", "end-of-program"];

fn field(id: &str, name: &str, field_type: FieldType) -> FieldDef {
    FieldDef {
        id: id.to_string(),
        name: name.to_string(),
        field_type,
        required: false,
        default: None,
        validation: None,
        list_key: None,
        help_text: None,
    }
}

fn required(mut def: FieldDef) -> FieldDef {
    def.required = true;
    def
}

fn bounded(mut def: FieldDef, min: Option<f64>, max: Option<f64>) -> FieldDef {
    def.validation = Some(FieldValidation { min, max });
    def
}

fn with_default(mut def: FieldDef, value: impl Into<FieldValue>) -> FieldDef {
    def.default = Some(value.into());
    def
}

fn with_help(mut def: FieldDef, text: &str) -> FieldDef {
    def.help_text = Some(text.to_string());
    def
}

fn select(id: &str, name: &str, list_key: &str) -> FieldDef {
    let mut def = field(id, name, FieldType::Select);
    def.list_key = Some(list_key.to_string());
    def
}

fn fixed_cost(id: &str, name: &str, frequencies: &[&str]) -> CostFieldDef {
    CostFieldDef {
        id: id.to_string(),
        name: name.to_string(),
        cost_type: CostType::Currency,
        is_percentage: false,
        percentage_of: None,
        has_frequency: !frequencies.is_empty(),
        frequency_options: frequencies.iter().map(|f| f.to_string()).collect(),
        has_custom_label: false,
    }
}

fn percentage_cost(id: &str, name: &str) -> CostFieldDef {
    CostFieldDef {
        id: id.to_string(),
        name: name.to_string(),
        cost_type: CostType::Percentage,
        is_percentage: true,
        percentage_of: Some(PERCENTAGE_OF_TOTAL_AMOUNT.to_string()),
        has_frequency: true,
        frequency_options: ALL_FREQUENCIES.iter().map(|f| f.to_string()).collect(),
        has_custom_label: false,
    }
}

fn options(pairs: &[(&str, &str)]) -> OptionList {
    pairs
        .iter()
        .map(|(id, name)| OptionItem {
            id: id.to_string(),
            name: name.to_string(),
            value: (*id).into(),
        })
        .collect()
}

fn certainty_field() -> FieldDef {
    with_help(
        bounded(
            with_default(
                field(keys::CERTAINTY_PERCENTAGE, "Certainty", FieldType::Percentage),
                100,
            ),
            Some(0.0),
            Some(100.0),
        ),
        "Probability the deal closes; weights the monthly forecast",
    )
}

fn blank(id: &str, name: &str, description: &str) -> CalculationTemplate {
    CalculationTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        version: "1.0".to_string(),
        status: TemplateStatus::Active,
        inherits_from: None,
        fields: None,
        cost_fields: None,
        formula: None,
        distribution_type: None,
        has_certainty_percentage: None,
        has_contract_duration: None,
        has_payment_frequency: None,
        system_lists: BTreeMap::new(),
        default_custom_lists: BTreeMap::new(),
    }
}

fn learnership_fields() -> Vec<FieldDef> {
    vec![
        required(bounded(
            field("learnerCount", "Number of learners", FieldType::Number),
            Some(1.0),
            None,
        )),
        required(bounded(
            with_default(
                field("costPerLearner", "Cost per learner", FieldType::Currency),
                28000,
            ),
            Some(0.0),
            None,
        )),
        select("qualification", "Qualification", "qualifications"),
        required(field(keys::START_DATE, "Start date", FieldType::Date)),
        bounded(
            with_default(field(keys::DURATION, "Duration (months)", FieldType::Number), 12),
            Some(1.0),
            Some(36.0),
        ),
        certainty_field(),
    ]
}

fn learnership_costs() -> Vec<CostFieldDef> {
    vec![
        fixed_cost("facilitation", "Facilitation", &ALL_FREQUENCIES),
        fixed_cost("stipends", "Learner stipends", &["monthly"]),
        fixed_cost("assessment", "Assessment & moderation", &["end-of-program", "once-off"]),
        percentage_cost("commission", "Sales commission"),
    ]
}

fn learnership() -> CalculationTemplate {
    let mut t = blank(
        "learnership",
        "Learnership",
        "Accredited learnership priced per learner, earned monthly over the programme",
    );
    t.fields = Some(learnership_fields());
    t.cost_fields = Some(learnership_costs());
    t.formula = Some(FormulaDef::Simple {
        expression: "learnerCount * costPerLearner".to_string(),
    });
    t.distribution_type = Some(DistributionType::Monthly);
    t.has_certainty_percentage = Some(true);
    t.has_contract_duration = Some(true);
    t.has_payment_frequency = Some(true);
    t.default_custom_lists.insert(
        "qualifications".to_string(),
        options(&[
            ("nqf2", "NQF Level 2"),
            ("nqf3", "NQF Level 3"),
            ("nqf4", "NQF Level 4"),
            ("nqf5", "NQF Level 5"),
        ]),
    );
    t
}

fn learnership_complex() -> CalculationTemplate {
    let mut t = blank(
        "learnership-complex",
        "Learnership (discounted)",
        "Learnership with a negotiated percentage discount",
    );
    t.inherits_from = Some("learnership".to_string());
    let mut fields = learnership_fields();
    fields.push(bounded(
        with_default(
            field("discountPercentage", "Discount", FieldType::Percentage),
            0,
        ),
        Some(0.0),
        Some(100.0),
    ));
    t.fields = Some(fields);
    t.formula = Some(FormulaDef::Custom {
        custom_calculator_id: "learnership-complex".to_string(),
    });
    t
}

fn subscription() -> CalculationTemplate {
    let mut t = blank(
        "subscription",
        "Platform subscription",
        "Per-user licence with volume tiers at 50, 100 and 200 users",
    );
    t.fields = Some(vec![
        required(bounded(
            field("userCount", "Users", FieldType::Number),
            Some(1.0),
            None,
        )),
        required(bounded(
            field("pricePerUser", "Price per user", FieldType::Currency),
            Some(0.0),
            None,
        )),
        required(field(keys::START_DATE, "Start date", FieldType::Date)),
        certainty_field(),
    ]);
    let mut support = fixed_cost("support", "Support desk", &["monthly", "once-off"]);
    support.has_custom_label = true;
    t.cost_fields = Some(vec![percentage_cost("licensing", "Vendor licensing"), support]);
    t.formula = Some(FormulaDef::Custom {
        custom_calculator_id: "subscription-tiered".to_string(),
    });
    t.distribution_type = Some(DistributionType::Annual);
    t.has_certainty_percentage = Some(true);
    t.has_payment_frequency = Some(true);
    t
}

fn training_workshop() -> CalculationTemplate {
    let mut t = blank(
        "training-workshop",
        "Training workshop",
        "Short course billed once on delivery",
    );
    t.fields = Some(vec![
        required(bounded(
            field("participants", "Participants", FieldType::Number),
            Some(1.0),
            Some(500.0),
        )),
        required(bounded(
            field("pricePerParticipant", "Price per participant", FieldType::Currency),
            Some(0.0),
            None,
        )),
        select("deliveryMode", "Delivery mode", "deliveryModes"),
        required(field(keys::INCOME_MONTH, "Invoice month", FieldType::Date)),
        certainty_field(),
    ]);
    let mut venue = fixed_cost("venue", "Venue hire", &[]);
    venue.has_custom_label = true;
    t.cost_fields = Some(vec![
        venue,
        fixed_cost("catering", "Catering", &[]),
        percentage_cost("facilitatorFee", "Facilitator fee"),
    ]);
    t.formula = Some(FormulaDef::Simple {
        expression: "participants * pricePerParticipant".to_string(),
    });
    t.distribution_type = Some(DistributionType::OnceOff);
    t.has_certainty_percentage = Some(true);
    t.system_lists.insert(
        "deliveryModes".to_string(),
        options(&[
            ("in-person", "In person"),
            ("virtual", "Virtual"),
            ("hybrid", "Hybrid"),
        ]),
    );
    t
}

fn virtual_workshop() -> CalculationTemplate {
    let mut t = blank(
        "virtual-workshop",
        "Virtual workshop",
        "Online delivery of a training workshop",
    );
    t.inherits_from = Some("training-workshop".to_string());
    t.default_custom_lists.insert(
        "platforms".to_string(),
        options(&[("teams", "Microsoft Teams"), ("zoom", "Zoom")]),
    );
    t
}

fn annual_license() -> CalculationTemplate {
    let mut t = blank(
        "annual-license",
        "Annual content licence",
        "Yearly licence fee recognised evenly over the financial year",
    );
    t.fields = Some(vec![
        required(bounded(
            field("licenseFee", "Licence fee", FieldType::Currency),
            Some(0.0),
            None,
        )),
        with_default(
            bounded(
                field("licenseCount", "Licences", FieldType::Number),
                Some(1.0),
                None,
            ),
            1,
        ),
    ]);
    t.cost_fields = Some(vec![fixed_cost("hosting", "Hosting", &["monthly", "once-off"])]);
    t.formula = Some(FormulaDef::Simple {
        expression: "licenseFee * licenseCount".to_string(),
    });
    t.distribution_type = Some(DistributionType::Annual);
    t
}

pub fn default_templates() -> Vec<CalculationTemplate> {
    vec![
        learnership(),
        learnership_complex(),
        subscription(),
        training_workshop(),
        virtual_workshop(),
        annual_license(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::CalculatorRegistry;
    use crate::registry::TemplateRegistry;
    use crate::validation::validate_template;

    #[test]
    fn test_default_templates_are_well_formed() {
        let registry = TemplateRegistry::default();
        let calculators = CalculatorRegistry::with_builtins();
        for template in default_templates() {
            let effective = registry.get_template(&template.id).unwrap();
            let issues = validate_template(&effective, &calculators);
            assert!(issues.is_empty(), "{}: {:?}", template.id, issues);
        }
    }

    #[test]
    fn test_virtual_workshop_inherits_everything() {
        let registry = TemplateRegistry::default();
        let effective = registry.get_template("virtual-workshop").unwrap();
        assert_eq!(effective.lineage, vec!["virtual-workshop", "training-workshop"]);
        assert_eq!(effective.distribution_type, DistributionType::OnceOff);
        assert_eq!(effective.fields.len(), 5);
        assert!(effective.system_lists.contains_key("deliveryModes"));
        assert!(effective.default_custom_lists.contains_key("platforms"));
    }
}
