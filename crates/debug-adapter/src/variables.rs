//! Scope and object expansion for the `variables` request.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use bridge_core_types::Variable;
use cdp_adapter::protocol::{PropertyDescriptor, RemoteObject};

use crate::error::AdapterError;

/// The prototype link always sorts last.
pub const PROTO_NAME: &str = "__proto__";

/// What a variables handle stands for.
#[derive(Clone, Debug)]
pub enum VariableContainer {
    Scope {
        object_id: String,
        this: Option<RemoteObject>,
    },
    Object {
        object_id: String,
    },
    /// Thrown value of an exception pause, rendered as a scope with a single entry.
    Exception {
        value: RemoteObject,
    },
}

/// What a container needs from the session to expand itself.
#[async_trait]
pub trait PropertySource: Send + Sync {
    async fn properties(
        &self,
        object_id: &str,
        accessors_only: bool,
    ) -> Result<Vec<PropertyDescriptor>, AdapterError>;

    /// Hands out a handle for a nested object, valid until the current pause ends. Once
    /// that pause is over it hands out 0 instead.
    fn allocate(&self, container: VariableContainer) -> i64;
}

impl VariableContainer {
    pub async fn expand(&self, source: &dyn PropertySource) -> Result<Vec<Variable>, AdapterError> {
        let mut variables = match self {
            VariableContainer::Scope { object_id, this } => {
                let mut variables = expand_object(source, object_id).await?;
                if let Some(this) = this {
                    variables.push(variable_for("this", this, source));
                }
                variables
            }
            VariableContainer::Object { object_id } => expand_object(source, object_id).await?,
            VariableContainer::Exception { value } => {
                vec![variable_for("exception", value, source)]
            }
        };
        sort_variables(&mut variables);
        Ok(variables)
    }
}

async fn expand_object(
    source: &dyn PropertySource,
    object_id: &str,
) -> Result<Vec<Variable>, AdapterError> {
    let own = source.properties(object_id, false).await?;
    let accessors = source.properties(object_id, true).await?;
    Ok(merge_properties(own, accessors)
        .iter()
        .map(|property| variable_for_property(property, source))
        .collect())
}

/// Merges the own-property and accessor-only answers by name. A name present in both
/// keeps the accessor entry (last write wins) at the position it was first seen.
pub fn merge_properties(
    own: Vec<PropertyDescriptor>,
    accessors: Vec<PropertyDescriptor>,
) -> Vec<PropertyDescriptor> {
    let mut order = Vec::new();
    let mut by_name: HashMap<String, PropertyDescriptor> = HashMap::new();
    for property in own.into_iter().chain(accessors) {
        if by_name.insert(property.name.clone(), property.clone()).is_none() {
            order.push(property.name);
        }
    }
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

fn numeric_name(name: &str) -> Option<f64> {
    name.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Non-numeric names lexically, then numeric names by value, then `__proto__`.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    match (a == PROTO_NAME, b == PROTO_NAME) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match (numeric_name(a), numeric_name(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_variables(variables: &mut [Variable]) {
    variables.sort_by(|a, b| compare_names(&a.name, &b.name));
}

fn variable_for(name: &str, value: &RemoteObject, source: &dyn PropertySource) -> Variable {
    let variables_reference = match &value.object_id {
        Some(object_id) => source.allocate(VariableContainer::Object {
            object_id: object_id.clone(),
        }),
        None => 0,
    };
    Variable {
        name: name.to_string(),
        value: display_value(value),
        kind: Some(value.kind.clone()).filter(|kind| !kind.is_empty()),
        variables_reference,
    }
}

fn variable_for_property(property: &PropertyDescriptor, source: &dyn PropertySource) -> Variable {
    match (&property.value, &property.get) {
        (Some(value), _) => variable_for(&property.name, value, source),
        (None, Some(_)) => Variable {
            name: property.name.clone(),
            value: "(...)".to_string(),
            kind: Some("accessor".to_string()),
            variables_reference: 0,
        },
        (None, None) => Variable {
            name: property.name.clone(),
            value: "undefined".to_string(),
            kind: Some("undefined".to_string()),
            variables_reference: 0,
        },
    }
}

/// Short display text for a remote value.
pub fn display_value(object: &RemoteObject) -> String {
    if object.kind == "undefined" {
        return "undefined".to_string();
    }
    if object.subtype.as_deref() == Some("null") {
        return "null".to_string();
    }
    if let Some(unserializable) = &object.unserializable_value {
        return unserializable.clone();
    }
    if object.is_primitive() {
        match &object.value {
            Some(serde_json::Value::String(text)) => return format!("\"{text}\""),
            Some(value) => return value.to_string(),
            None => {}
        }
    }
    object
        .description
        .clone()
        .or_else(|| object.class_name.clone())
        .unwrap_or_else(|| object.kind.clone())
}
