//! Resource/verb routing to query templates.

use std::fmt;

use mimic_query::{Operation, QueryError, TemplateRegistry, bind, bind_with_identity};
use mimic_warehouse::BoundParameter;
use serde_json::Value;

/// Record kinds exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Patient,
    Admission,
    Question,
    Answer,
}

impl Resource {
    /// Payload field a path identifier is bound to.
    pub fn identity_field(&self) -> Option<&'static str> {
        match self {
            Resource::Patient => Some("subject_id"),
            Resource::Admission => Some("hadm_id"),
            Resource::Question | Resource::Answer => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Patient => "patient",
            Resource::Admission => "admission",
            Resource::Question => "question",
            Resource::Answer => "answer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Operation served by a resource/verb pair, if any.
pub fn operation_for(resource: Resource, verb: Verb) -> Option<Operation> {
    let op = match (resource, verb) {
        (Resource::Patient, Verb::Post) => Operation::CreatePatient,
        (Resource::Patient, Verb::Put) => Operation::UpdatePatient,
        (Resource::Patient, Verb::Delete) => Operation::DeletePatient,
        (Resource::Patient, Verb::Get) => Operation::ListPatients,
        (Resource::Admission, Verb::Post) => Operation::CreateAdmission,
        (Resource::Admission, Verb::Put) => Operation::UpdateAdmission,
        (Resource::Question, Verb::Post) => Operation::CreateQuestion,
        (Resource::Question, Verb::Get) => Operation::ListQuestions,
        (Resource::Answer, Verb::Post) => Operation::CreateAnswer,
        _ => return None,
    };
    Some(op)
}

/// Selects the template for a request and binds its parameters.
///
/// A path identifier is merged into the payload under the resource's identity
/// field after the payload has been checked for immutable fields.
///
/// # Errors
///
/// Returns `UnsupportedRoute` for pairs without a template and any binder
/// error otherwise.
pub fn dispatch(
    registry: &TemplateRegistry,
    resource: Resource,
    verb: Verb,
    path_id: Option<&str>,
    payload: &Value,
) -> Result<(Operation, Vec<BoundParameter>), QueryError> {
    let operation = operation_for(resource, verb)
        .ok_or_else(|| QueryError::unsupported_route(resource.to_string(), verb.to_string()))?;
    let template = registry.lookup(operation);

    let params = match (path_id, resource.identity_field()) {
        (Some(id), Some(field)) => {
            bind_with_identity(template, payload, field, Value::String(id.to_string()))?
        }
        (Some(_), None) => {
            return Err(QueryError::unsupported_route(
                format!("{resource}/{{id}}"),
                verb.to_string(),
            ));
        }
        (None, _) => bind(template, payload)?,
    };

    tracing::debug!(
        resource = %resource,
        verb = %verb,
        operation = %operation,
        params = params.len(),
        "Request dispatched"
    );
    Ok((operation, params))
}
