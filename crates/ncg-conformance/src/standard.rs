//! Seam to the modeling engine that suites exercise.
//!
//! Suites only see [`ModelApi`], [`Standard`] and [`Model`]. The engine
//! itself is out of scope; [`TableModelApi`] answers from in-memory tables
//! so suites can be run and pinned without it.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl AttributeValue {
    /// Scalars only; null, arrays and objects have no attribute form.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64().map(Self::Number),
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Bool(flag) => Some(Self::Flag(*flag)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(number) => serde_json::Number::from_f64(*number)
                .map_or(Value::Null, Value::Number),
            Self::Text(text) => Value::String(text.clone()),
            Self::Flag(flag) => Value::Bool(*flag),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StandardError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("template `{template}` has no prototype for building type `{building_type}`")]
    UnknownBuildingType {
        template: String,
        building_type: String,
    },
    #[error("override `{0}` must be a number, string or bool")]
    InvalidOverride(String),
    #[error("{0}")]
    Collaborator(String),
}

/// Inputs to [`Standard::model_create_prototype_model`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrototypeRequest {
    pub building_type: String,
    pub epw_file: Option<String>,
    pub sizing_run_dir: Option<PathBuf>,
    /// Attribute values the case forces onto the model, e.g. a tested
    /// equipment capacity.
    pub overrides: Map<String, Value>,
}

impl PrototypeRequest {
    #[must_use]
    pub fn new(building_type: impl Into<String>) -> Self {
        Self {
            building_type: building_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn epw_file(mut self, epw_file: impl Into<String>) -> Self {
        self.epw_file = Some(epw_file.into());
        self
    }

    #[must_use]
    pub fn sizing_run_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sizing_run_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn override_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }
}

pub trait ModelApi: Send + Sync {
    fn build(&self, template: &str) -> Result<Box<dyn Standard>, StandardError>;
}

pub trait Standard: Send {
    fn template(&self) -> &str;

    fn model_create_prototype_model(
        &self,
        request: &PrototypeRequest,
    ) -> Result<Box<dyn Model>, StandardError>;
}

pub trait Model: Send {
    fn attribute(&self, name: &str) -> Option<AttributeValue>;

    fn attribute_names(&self) -> Vec<String>;

    /// Every attribute as a JSON object, in `attribute_names` order.
    fn attributes_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for name in self.attribute_names() {
            if let Some(value) = self.attribute(&name) {
                out.insert(name, value.to_json());
            }
        }
        out
    }
}

type PrototypeTable = BTreeMap<String, BTreeMap<String, AttributeValue>>;

/// Table-driven [`ModelApi`]: template -> building type -> attributes.
#[derive(Debug, Clone, Default)]
pub struct TableModelApi {
    templates: BTreeMap<String, PrototypeTable>,
}

impl TableModelApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prototype<I, K>(mut self, template: &str, building_type: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let table = self
            .templates
            .entry(template.to_string())
            .or_default()
            .entry(building_type.to_string())
            .or_default();
        for (name, value) in attributes {
            table.insert(name.into(), value);
        }
        self
    }

    /// Reads `{template: {building_type: {attribute: scalar}}}`.
    pub fn from_json(tables: &Value) -> Result<Self, StandardError> {
        let templates = tables.as_object().ok_or_else(|| {
            StandardError::Collaborator("prototype tables must be a JSON object".to_string())
        })?;
        let mut api = Self::new();
        for (template, buildings) in templates {
            let buildings = buildings.as_object().ok_or_else(|| {
                StandardError::Collaborator(format!(
                    "template `{template}` must map building types"
                ))
            })?;
            api.templates.entry(template.clone()).or_default();
            for (building_type, attributes) in buildings {
                let attributes = attributes.as_object().ok_or_else(|| {
                    StandardError::Collaborator(format!(
                        "prototype `{template}/{building_type}` must map attribute names"
                    ))
                })?;
                let mut parsed = Vec::with_capacity(attributes.len());
                for (name, value) in attributes {
                    let value = AttributeValue::from_json(value)
                        .ok_or_else(|| StandardError::InvalidOverride(name.clone()))?;
                    parsed.push((name.clone(), value));
                }
                api = api.prototype(template, building_type, parsed);
            }
        }
        Ok(api)
    }

    #[must_use]
    pub fn templates(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}

impl ModelApi for TableModelApi {
    fn build(&self, template: &str) -> Result<Box<dyn Standard>, StandardError> {
        let prototypes = self
            .templates
            .get(template)
            .ok_or_else(|| StandardError::UnknownTemplate(template.to_string()))?;
        Ok(Box::new(TableStandard {
            template: template.to_string(),
            prototypes: prototypes.clone(),
        }))
    }
}

struct TableStandard {
    template: String,
    prototypes: PrototypeTable,
}

impl Standard for TableStandard {
    fn template(&self) -> &str {
        &self.template
    }

    fn model_create_prototype_model(
        &self,
        request: &PrototypeRequest,
    ) -> Result<Box<dyn Model>, StandardError> {
        let mut attributes = self
            .prototypes
            .get(&request.building_type)
            .cloned()
            .ok_or_else(|| StandardError::UnknownBuildingType {
                template: self.template.clone(),
                building_type: request.building_type.clone(),
            })?;
        for (name, value) in &request.overrides {
            let value = AttributeValue::from_json(value)
                .ok_or_else(|| StandardError::InvalidOverride(name.clone()))?;
            attributes.insert(name.clone(), value);
        }
        if let Some(epw) = &request.epw_file {
            attributes.insert("weather_file".to_string(), AttributeValue::Text(epw.clone()));
        }
        Ok(Box::new(TableModel { attributes }))
    }
}

struct TableModel {
    attributes: BTreeMap<String, AttributeValue>,
}

impl Model for TableModel {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).cloned()
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeValue, ModelApi, PrototypeRequest, StandardError, TableModelApi};
    use serde_json::json;

    fn api() -> TableModelApi {
        TableModelApi::new().prototype(
            "NECB2011",
            "SmallOffice",
            [
                ("floor_area_m2", AttributeValue::from(511.2)),
                ("heating_fuel", AttributeValue::from("NaturalGas")),
                ("has_dcv", AttributeValue::from(false)),
            ],
        )
    }

    #[test]
    fn prototype_models_expose_table_attributes() {
        let standard = api().build("NECB2011").expect("template");
        assert_eq!(standard.template(), "NECB2011");
        let model = standard
            .model_create_prototype_model(&PrototypeRequest::new("SmallOffice"))
            .expect("prototype");
        assert_eq!(
            model.attribute("floor_area_m2").and_then(|v| v.as_f64()),
            Some(511.2)
        );
        assert_eq!(model.attribute("missing"), None);
        assert_eq!(
            model.attributes_json(),
            json!({"floor_area_m2": 511.2, "has_dcv": false, "heating_fuel": "NaturalGas"})
                .as_object()
                .cloned()
                .expect("object")
        );
    }

    #[test]
    fn overrides_and_weather_file_are_applied() {
        let standard = api().build("NECB2011").expect("template");
        let request = PrototypeRequest::new("SmallOffice")
            .epw_file("CAN_ON_Toronto.Pearson.Intl.AP.716240_CWEC2016.epw")
            .override_attribute("heating_fuel", "Electricity");
        let model = standard.model_create_prototype_model(&request).expect("prototype");
        assert_eq!(
            model.attribute("heating_fuel"),
            Some(AttributeValue::Text("Electricity".to_string()))
        );
        assert!(model.attribute_names().contains(&"weather_file".to_string()));

        let bad = PrototypeRequest::new("SmallOffice").override_attribute("zones", json!([1, 2]));
        assert_eq!(
            standard.model_create_prototype_model(&bad).err(),
            Some(StandardError::InvalidOverride("zones".to_string()))
        );
    }

    #[test]
    fn unknown_template_and_building_type_are_errors() {
        assert_eq!(
            api().build("NECB2020").err().map(|err| err.to_string()),
            Some("unknown template `NECB2020`".to_string())
        );
        let standard = api().build("NECB2011").expect("template");
        let err = standard
            .model_create_prototype_model(&PrototypeRequest::new("Warehouse"))
            .err()
            .expect("missing prototype");
        assert_eq!(
            err,
            StandardError::UnknownBuildingType {
                template: "NECB2011".to_string(),
                building_type: "Warehouse".to_string(),
            }
        );
    }

    #[test]
    fn tables_load_from_json() {
        let api = TableModelApi::from_json(&json!({
            "NECB2015": {"sys2_scroll": {"COP_kW_kW": 5.633, "chiller_name": "Scroll"}},
            "NECB2020": {}
        }))
        .expect("tables");
        assert_eq!(api.templates(), ["NECB2015", "NECB2020"]);
        let empty = api
            .build("NECB2020")
            .expect("template without prototypes still builds");
        assert!(matches!(
            empty.model_create_prototype_model(&PrototypeRequest::new("sys2_scroll")),
            Err(StandardError::UnknownBuildingType { .. })
        ));
        assert!(TableModelApi::from_json(&json!({"NECB2015": {"x": {"y": null}}})).is_err());
    }
}
