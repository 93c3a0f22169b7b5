use crate::tree::{CaseEntry, CaseLeaf, CaseTree};
use crate::{CaseError, TEST_PARS_KEY, is_reserved};
use indexmap::IndexSet;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<Value>,
}

/// Named axes of variation plus the `TestPars` payload copied into every
/// generated leaf. Axis order decides nesting order.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSpec {
    axes: Vec<Axis>,
    test_pars: Value,
}

impl Default for AxisSpec {
    fn default() -> Self {
        Self {
            axes: Vec::new(),
            test_pars: Value::Object(Map::new()),
        }
    }
}

impl AxisSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn axis<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.axes.push(Axis {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    #[must_use]
    pub fn test_pars(mut self, test_pars: Value) -> Self {
        self.test_pars = test_pars;
        self
    }

    /// Reads the JSON form used by suite definitions:
    /// `{"Vintage": ["NECB2011"], "TestCase": ["small"], "TestPars": {...}}`.
    /// Axis order follows document order.
    pub fn from_json(spec: &Value) -> Result<Self, CaseError> {
        let object = spec.as_object().ok_or(CaseError::SpecNotMapping)?;
        let mut out = Self::new();
        for (name, values) in object {
            if name == TEST_PARS_KEY {
                out.test_pars = values.clone();
                continue;
            }
            let values = values
                .as_array()
                .ok_or_else(|| CaseError::AxisNotSequence(name.clone()))?;
            out = out.axis(name.clone(), values.iter().cloned());
        }
        Ok(out)
    }

    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    #[must_use]
    pub fn test_pars_value(&self) -> &Value {
        &self.test_pars
    }

    /// Number of leaves `make_test_cases` produces.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes
            .iter()
            .map(|axis| axis.values.len())
            .try_fold(1usize, usize::checked_mul)
            .unwrap_or(usize::MAX)
    }

    fn validate(&self) -> Result<(Vec<(String, Vec<String>)>, Map<String, Value>), CaseError> {
        if self.axes.is_empty() {
            return Err(CaseError::NoAxes);
        }

        let test_pars = match &self.test_pars {
            Value::Object(map) => map.clone(),
            other => return Err(CaseError::TestParsNotMapping(json_kind(other).to_string())),
        };

        let mut names = IndexSet::new();
        let mut resolved = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            if is_reserved(&axis.name) {
                return Err(CaseError::ReservedKey(axis.name.clone()));
            }
            if !names.insert(axis.name.as_str()) {
                return Err(CaseError::DuplicateAxis(axis.name.clone()));
            }
            if axis.values.is_empty() {
                return Err(CaseError::EmptyAxis(axis.name.clone()));
            }

            let mut keys = IndexSet::with_capacity(axis.values.len());
            for value in &axis.values {
                let key = axis_key(&axis.name, value)?;
                if is_reserved(&key) {
                    return Err(CaseError::ReservedKey(key));
                }
                if !keys.insert(key.clone()) {
                    return Err(CaseError::DuplicateAxisValue {
                        axis: axis.name.clone(),
                        key,
                    });
                }
            }
            resolved.push((axis.name.clone(), keys.into_iter().collect()));
        }

        Ok((resolved, test_pars))
    }
}

/// Canonical case key of an axis value: strings verbatim, numbers by their
/// JSON text, booleans as `true`/`false`.
pub fn axis_key(axis: &str, value: &Value) -> Result<String, CaseError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(CaseError::InvalidAxisValue {
            axis: axis.to_string(),
            value: other.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Expands the Cartesian product of every axis into a nested case tree.
pub fn make_test_cases(spec: &AxisSpec) -> Result<CaseTree, CaseError> {
    let (axes, test_pars) = spec.validate()?;
    Ok(build_level(&axes, &test_pars))
}

fn build_level(axes: &[(String, Vec<String>)], test_pars: &Map<String, Value>) -> CaseTree {
    let mut tree = CaseTree::new();
    let Some(((name, keys), rest)) = axes.split_first() else {
        return tree;
    };

    for key in keys {
        let entry = if rest.is_empty() {
            CaseEntry::Leaf(CaseLeaf {
                axis: name.clone(),
                test_pars: test_pars.clone(),
            })
        } else {
            CaseEntry::Branch {
                axis: Some(name.clone()),
                children: build_level(rest, test_pars),
            }
        };
        tree.insert_entry(key.clone(), entry);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::{AxisSpec, axis_key, make_test_cases};
    use crate::CaseError;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn two_vintages_one_case_scenario() {
        let spec = AxisSpec::new()
            .axis("vintage", ["NECB2011", "NECB2015"])
            .axis("TestCase", ["case-1"])
            .test_pars(json!({"x": 1}));

        let cases = make_test_cases(&spec).expect("spec should expand");
        assert_eq!(cases.leaf_count(), 2);
        assert_eq!(
            cases.to_json(),
            json!({
                "NECB2011": {"case-1": {"TestPars": {"x": 1}}},
                "NECB2015": {"case-1": {"TestPars": {"x": 1}}}
            })
        );
        assert_eq!(
            cases.leaf_paths(),
            vec![
                vec!["NECB2011".to_string(), "case-1".to_string()],
                vec!["NECB2015".to_string(), "case-1".to_string()],
            ]
        );
    }

    #[test]
    fn nesting_follows_axis_and_value_order() {
        let spec = AxisSpec::new()
            .axis("Vintage", ["NECB2020", "NECB2011"])
            .axis("ChillerType", ["Scroll", "Centrifugal", "Rotary Screw"])
            .axis("TestCase", ["small"]);
        let cases = make_test_cases(&spec).expect("spec should expand");

        let top: Vec<&String> = cases.keys().collect();
        assert_eq!(top, ["NECB2020", "NECB2011"]);
        let paths = cases.leaf_paths();
        assert_eq!(paths.len(), 6);
        assert_eq!(paths[0], ["NECB2020", "Scroll", "small"]);
        assert_eq!(paths[2], ["NECB2020", "Rotary Screw", "small"]);
        assert_eq!(paths[3], ["NECB2011", "Scroll", "small"]);
    }

    #[test]
    fn from_json_reads_document_order_and_test_pars() {
        let raw = json!({
            "Vintage": ["NECB2011", "NECB2020"],
            "ChillerType": ["Scroll"],
            "TestCase": ["large"],
            "TestPars": {"tested_capacity_kW": 791}
        });
        let spec = AxisSpec::from_json(&raw).expect("valid spec");
        let names: Vec<&str> = spec.axes().iter().map(|axis| axis.name.as_str()).collect();
        assert_eq!(names, ["Vintage", "ChillerType", "TestCase"]);
        assert_eq!(spec.leaf_count(), 2);

        let cases = make_test_cases(&spec).expect("spec should expand");
        assert_eq!(
            cases.to_json()["NECB2020"]["Scroll"]["large"],
            json!({"TestPars": {"tested_capacity_kW": 791}})
        );
    }

    #[test]
    fn input_spec_is_not_mutated_and_leaves_do_not_share_pars() {
        let spec = AxisSpec::new()
            .axis("TestCase", ["a", "b"])
            .test_pars(json!({"nested": {"k": [1, 2]}}));
        let before = spec.clone();
        let mut cases = make_test_cases(&spec).expect("spec should expand");
        assert_eq!(spec, before);

        if let Some(leaf) = cases.leaf_mut(&["a"]) {
            leaf.test_pars.insert("k".to_string(), json!("changed"));
        }
        assert_eq!(cases.to_json()["b"], json!({"TestPars": {"nested": {"k": [1, 2]}}}));
    }

    #[test]
    fn generation_errors_fail_fast() {
        assert_eq!(make_test_cases(&AxisSpec::new()), Err(CaseError::NoAxes));

        let empty = AxisSpec::new().axis("Vintage", Vec::<String>::new());
        assert_eq!(
            make_test_cases(&empty),
            Err(CaseError::EmptyAxis("Vintage".to_string()))
        );

        let bad_pars = AxisSpec::new()
            .axis("TestCase", ["a"])
            .test_pars(json!([1, 2]));
        assert_eq!(
            make_test_cases(&bad_pars),
            Err(CaseError::TestParsNotMapping("a sequence".to_string()))
        );

        let collision = AxisSpec::new().axis("Capacity", [json!(1), json!("1")]);
        assert_eq!(
            make_test_cases(&collision),
            Err(CaseError::DuplicateAxisValue {
                axis: "Capacity".to_string(),
                key: "1".to_string()
            })
        );

        let repeated = AxisSpec::new().axis("A", ["x"]).axis("A", ["y"]);
        assert_eq!(
            make_test_cases(&repeated),
            Err(CaseError::DuplicateAxis("A".to_string()))
        );

        let reserved = AxisSpec::new().axis("TestPars", ["x"]);
        assert_eq!(
            make_test_cases(&reserved),
            Err(CaseError::ReservedKey("TestPars".to_string()))
        );
    }

    #[test]
    fn from_json_rejects_malformed_specs() {
        assert_eq!(
            AxisSpec::from_json(&json!(["NECB2011"])),
            Err(CaseError::SpecNotMapping)
        );
        assert_eq!(
            AxisSpec::from_json(&json!({"Vintage": "NECB2011"})),
            Err(CaseError::AxisNotSequence("Vintage".to_string()))
        );
    }

    #[test]
    fn axis_keys_are_canonical_strings() {
        assert_eq!(axis_key("a", &json!("NECB2011")).as_deref(), Ok("NECB2011"));
        assert_eq!(axis_key("a", &json!(132)).as_deref(), Ok("132"));
        assert_eq!(axis_key("a", &json!(1.5)).as_deref(), Ok("1.5"));
        assert_eq!(axis_key("a", &json!(true)).as_deref(), Ok("true"));
        assert!(matches!(
            axis_key("a", &json!(null)),
            Err(CaseError::InvalidAxisValue { .. })
        ));
        assert!(matches!(
            axis_key("a", &json!({"k": 1})),
            Err(CaseError::InvalidAxisValue { .. })
        ));
    }

    fn arb_axis_sizes() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..5, 1..5)
    }

    proptest! {
        #[test]
        fn leaf_count_is_product_of_axis_sizes(sizes in arb_axis_sizes()) {
            let mut spec = AxisSpec::new().test_pars(json!({"x": 1}));
            for (idx, size) in sizes.iter().enumerate() {
                spec = spec.axis(format!("axis{idx}"), (0..*size).map(|v| format!("v{v}")));
            }
            let cases = make_test_cases(&spec).expect("spec should expand");
            let expected: usize = sizes.iter().product();
            prop_assert_eq!(cases.leaf_count(), expected);
            prop_assert_eq!(spec.leaf_count(), expected);
            prop_assert_eq!(cases.leaf_paths().len(), expected);
        }

        #[test]
        fn generation_is_deterministic(sizes in arb_axis_sizes()) {
            let mut spec = AxisSpec::new();
            for (idx, size) in sizes.iter().enumerate() {
                spec = spec.axis(format!("axis{idx}"), (0..*size).map(|v| format!("v{v}")));
            }
            let first = make_test_cases(&spec).expect("spec should expand");
            let second = make_test_cases(&spec).expect("spec should expand");
            prop_assert_eq!(first.leaf_paths(), second.leaf_paths());
        }
    }
}
