//! Parameter schema and coercion
//!
//! Step parameters arrive as arbitrary documents; this module is the one
//! place that turns documents into typed arguments. The coercion table is
//! exhaustive and allows exactly one implicit conversion: an
//! integral-valued float becomes an integer (`1.0` → `1`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Where a declared parameter is resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    /// The live execution results map (caller input merged with step results)
    Input,

    /// The step's own parameter mapping
    Static,
}

impl std::fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Static => write!(f, "static"),
        }
    }
}

/// Expected shape of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
    Any,
}

impl ValueKind {
    /// Coerce `value` to this kind, or explain why it cannot be.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        match self {
            Self::Any => Ok(value.clone()),
            Self::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(format!("expected string, got {}", type_name(other))),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::Number(n) => {
                    // Deserialized numerics often arrive as floats; accept
                    // them only when integral-valued.
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    if f.is_finite() && f.fract() == 0.0 && f.abs() <= i64::MAX as f64 {
                        Ok(Value::from(f as i64))
                    } else {
                        Err(format!("expected integer, got non-integral number {n}"))
                    }
                }
                other => Err(format!("expected integer, got {}", type_name(other))),
            },
            Self::Float => match value {
                Value::Number(_) => Ok(value.clone()),
                other => Err(format!("expected float, got {}", type_name(other))),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(format!("expected boolean, got {}", type_name(other))),
            },
            Self::Object => match value {
                Value::Object(_) => Ok(value.clone()),
                other => Err(format!("expected object, got {}", type_name(other))),
            },
            Self::Array => match value {
                Value::Array(_) => Ok(value.clone()),
                other => Err(format!("expected array, got {}", type_name(other))),
            },
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter of an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub source: ParameterSource,
    pub kind: ValueKind,
    pub required: bool,
}

impl ParameterDefinition {
    /// A required parameter
    pub fn required(name: &str, source: ParameterSource, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            source,
            kind,
            required: true,
        }
    }

    /// An optional parameter
    pub fn optional(name: &str, source: ParameterSource, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            source,
            kind,
            required: false,
        }
    }
}

/// Resolve every declared parameter against its source map.
///
/// `static_params` is the step's own mapping, `inputs` the live execution
/// results. Missing required parameters and non-convertible values fail
/// with an error naming the parameter and its declared source.
pub fn resolve_parameters(
    definitions: &[ParameterDefinition],
    static_params: &Map<String, Value>,
    inputs: &Map<String, Value>,
) -> Result<Map<String, Value>, CoreError> {
    let mut resolved = Map::new();

    for def in definitions {
        let source_map = match def.source {
            ParameterSource::Input => inputs,
            ParameterSource::Static => static_params,
        };

        match source_map.get(&def.name) {
            None => {
                if def.required {
                    return Err(CoreError::InvalidArgument(format!(
                        "missing required parameter \"{}\" from {} source",
                        def.name, def.source
                    )));
                }
            }
            Some(value) => {
                let coerced = def.kind.coerce(value).map_err(|reason| {
                    CoreError::InvalidArgument(format!(
                        "parameter \"{}\" from {} source: {reason}",
                        def.name, def.source
                    ))
                })?;
                resolved.insert(def.name.clone(), coerced);
            }
        }
    }

    Ok(resolved)
}
