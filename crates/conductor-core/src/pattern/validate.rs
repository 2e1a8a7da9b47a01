//! Pattern validation
//!
//! Rejects malformed patterns before they reach the store or the executor:
//! empty names, zero steps, missing types/actions, non-positive timeouts,
//! duplicate or reserved action names, and dependency references that don't
//! resolve to an earlier step. Requiring dependencies to be listed before
//! their dependents makes the step list a topological order, which also
//! rules out cycles.

use std::collections::HashMap;
use std::time::Duration;

use super::Pattern;
use crate::error::CoreError;

/// Input keys the built-in buckets resolve from the caller's input bundle.
/// Step action names may not shadow them, since caller input and step
/// results share one namespace.
pub(crate) const RESERVED_INPUT_KEYS: &[&str] = &[
    "parent_id",
    "child_id",
    "master_id",
    "type",
    "metadata",
    "entity_type",
    "event_type",
    "payload",
    "status",
    "depth",
    "from_id",
    "to_id",
];

/// Error type for pattern validation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pattern name must not be empty")]
    MissingName,

    #[error("pattern must declare at least one step")]
    NoSteps,

    #[error("step {index}: type and action must not be empty")]
    MissingTypeOrAction { index: usize },

    #[error("step \"{action}\": timeout must be positive")]
    ZeroTimeout { action: String },

    #[error("duplicate step action \"{action}\"")]
    DuplicateAction { action: String },

    #[error("step action \"{action}\" shadows a reserved input key")]
    ReservedAction { action: String },

    #[error("step \"{action}\" depends on unknown step \"{dependency}\"")]
    UnknownDependency { action: String, dependency: String },

    #[error("step \"{action}\" depends on \"{dependency}\", which must be listed before it")]
    OrderViolation { action: String, dependency: String },
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::DuplicateAction { .. } | ValidationError::OrderViolation { .. } => {
                CoreError::Conflict(err.to_string())
            }
            other => CoreError::InvalidArgument(other.to_string()),
        }
    }
}

/// Validate a pattern definition.
pub fn validate(pattern: &Pattern) -> Result<(), ValidationError> {
    if pattern.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if pattern.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(pattern.steps.len());
    for (index, step) in pattern.steps.iter().enumerate() {
        if step.step_type.trim().is_empty() || step.action.trim().is_empty() {
            return Err(ValidationError::MissingTypeOrAction { index });
        }
        if step.timeout == Duration::ZERO {
            return Err(ValidationError::ZeroTimeout {
                action: step.action.clone(),
            });
        }
        if RESERVED_INPUT_KEYS.contains(&step.action.as_str()) {
            return Err(ValidationError::ReservedAction {
                action: step.action.clone(),
            });
        }
        if positions.insert(step.action.as_str(), index).is_some() {
            return Err(ValidationError::DuplicateAction {
                action: step.action.clone(),
            });
        }
    }

    for (index, step) in pattern.steps.iter().enumerate() {
        for dependency in &step.depends_on {
            match positions.get(dependency.as_str()) {
                None => {
                    return Err(ValidationError::UnknownDependency {
                        action: step.action.clone(),
                        dependency: dependency.clone(),
                    });
                }
                Some(&dep_index) if dep_index >= index => {
                    return Err(ValidationError::OrderViolation {
                        action: step.action.clone(),
                        dependency: dependency.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Step;
    use std::time::Duration;

    fn step(action: &str) -> Step {
        Step::new("event", action, Duration::from_secs(5))
    }

    fn pattern(steps: Vec<Step>) -> Pattern {
        Pattern::new("p", steps)
    }

    #[test]
    fn test_valid_chain_passes() {
        let p = pattern(vec![
            step("first"),
            step("second").with_depends_on(vec!["first".into()]),
        ]);
        assert!(validate(&p).is_ok());
    }

    #[test]
    fn test_empty_name_and_zero_steps() {
        let mut p = pattern(vec![step("a")]);
        p.name = "  ".into();
        assert_eq!(validate(&p), Err(ValidationError::MissingName));

        let p = pattern(vec![]);
        assert_eq!(validate(&p), Err(ValidationError::NoSteps));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut s = step("a");
        s.timeout = Duration::ZERO;
        assert_eq!(
            validate(&pattern(vec![s])),
            Err(ValidationError::ZeroTimeout { action: "a".into() })
        );
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let p = pattern(vec![step("a"), step("a")]);
        assert_eq!(
            validate(&p),
            Err(ValidationError::DuplicateAction { action: "a".into() })
        );
    }

    #[test]
    fn test_reserved_action_rejected() {
        let p = pattern(vec![step("payload")]);
        assert_eq!(
            validate(&p),
            Err(ValidationError::ReservedAction {
                action: "payload".into()
            })
        );
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let p = pattern(vec![step("a").with_depends_on(vec!["ghost".into()])]);
        assert_eq!(
            validate(&p),
            Err(ValidationError::UnknownDependency {
                action: "a".into(),
                dependency: "ghost".into()
            })
        );
    }

    #[test]
    fn test_forward_reference_rejected() {
        // "a" waits on "b", but "b" is listed after it.
        let p = pattern(vec![
            step("a").with_depends_on(vec!["b".into()]),
            step("b"),
        ]);
        assert_eq!(
            validate(&p),
            Err(ValidationError::OrderViolation {
                action: "a".into(),
                dependency: "b".into()
            })
        );
    }

    #[test]
    fn test_cycle_rejected() {
        // Self-dependency is the tightest cycle.
        let p = pattern(vec![step("a").with_depends_on(vec!["a".into()])]);
        assert!(matches!(
            validate(&p),
            Err(ValidationError::OrderViolation { .. })
        ));
    }

    #[test]
    fn test_maps_to_stable_error_kinds() {
        use crate::error::ErrorKind;

        let conflict: CoreError = ValidationError::DuplicateAction { action: "a".into() }.into();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let invalid: CoreError = ValidationError::NoSteps.into();
        assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
    }
}
