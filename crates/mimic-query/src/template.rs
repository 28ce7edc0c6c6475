//! Query template catalog.
//!
//! Every record operation maps to exactly one [`QueryTemplate`]. Templates are
//! built once at startup against the configured dataset and checked for
//! consistency between the statement and its declared parameters.

use std::collections::HashSet;
use std::fmt;

use mimic_warehouse::{Expr, ScalarType, Statement, StatementShape, TableRef};
use serde::Serialize;

use crate::error::QueryError;

const PATIENTS: &str = "PATIENTS";
const ADMISSIONS: &str = "ADMISSIONS";
const QUESTIONS: &str = "QUESTIONS";
const ANSWERS: &str = "ANSWERS";

/// Rows returned by the list operations.
pub const LIST_LIMIT: u64 = 10;

/// Record operations served by the façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    CreateAdmission,
    UpdateAdmission,
    CreateQuestion,
    CreateAnswer,
    ListPatients,
    ListQuestions,
}

impl Operation {
    /// All operations, in catalog order.
    pub const ALL: [Operation; 9] = [
        Operation::CreatePatient,
        Operation::UpdatePatient,
        Operation::DeletePatient,
        Operation::CreateAdmission,
        Operation::UpdateAdmission,
        Operation::CreateQuestion,
        Operation::CreateAnswer,
        Operation::ListPatients,
        Operation::ListQuestions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreatePatient => "create_patient",
            Operation::UpdatePatient => "update_patient",
            Operation::DeletePatient => "delete_patient",
            Operation::CreateAdmission => "create_admission",
            Operation::UpdateAdmission => "update_admission",
            Operation::CreateQuestion => "create_question",
            Operation::CreateAnswer => "create_answer",
            Operation::ListPatients => "list_patients",
            Operation::ListQuestions => "list_questions",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a parameter must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Absent or null is a `MissingField` error.
    Required,
    /// Absent or null binds SQL NULL.
    Nullable,
}

/// Declared statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ScalarType,
    pub presence: Presence,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ScalarType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Required,
        }
    }

    pub const fn nullable(name: &'static str, ty: ScalarType) -> Self {
        Self {
            name,
            ty,
            presence: Presence::Nullable,
        }
    }
}

/// One parameterized statement and its input contract.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub operation: Operation,
    pub statement: Statement,
    /// Parameters in binding order.
    pub parameters: Vec<ParamSpec>,
    /// Nullable parameters of which at least one must be present.
    pub require_any: &'static [&'static str],
    /// Payload fields that may not be supplied by the caller.
    pub immutable: &'static [&'static str],
}

impl QueryTemplate {
    fn new(operation: Operation, statement: Statement, parameters: Vec<ParamSpec>) -> Self {
        Self {
            operation,
            statement,
            parameters,
            require_any: &[],
            immutable: &[],
        }
    }

    fn with_require_any(mut self, names: &'static [&'static str]) -> Self {
        self.require_any = names;
        self
    }

    fn with_immutable(mut self, names: &'static [&'static str]) -> Self {
        self.immutable = names;
        self
    }

    pub fn shape(&self) -> StatementShape {
        self.statement.shape
    }

    pub fn table(&self) -> &TableRef {
        &self.statement.table
    }

    pub fn sql(&self) -> String {
        self.statement.to_sql()
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Checks that the statement and the declared parameters agree.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidTemplate` when a parameter is declared
    /// twice, referenced but undeclared, declared but unreferenced, or when
    /// `require_any` names something other than a nullable parameter.
    pub fn validate(&self) -> Result<(), QueryError> {
        let invalid = |message: String| QueryError::invalid_template(self.operation, message);

        let mut declared = HashSet::new();
        for param in &self.parameters {
            if !declared.insert(param.name) {
                return Err(invalid(format!("parameter '{}' declared twice", param.name)));
            }
        }

        let referenced: HashSet<&str> = self.statement.referenced_params().into_iter().collect();
        if let Some(name) = referenced.iter().find(|name| !declared.contains(*name)) {
            return Err(invalid(format!("parameter '{name}' is not declared")));
        }
        if let Some(name) = declared.iter().find(|name| !referenced.contains(*name)) {
            return Err(invalid(format!("parameter '{name}' is never referenced")));
        }

        for name in self.require_any {
            match self.param(name) {
                Some(param) if param.presence == Presence::Nullable => {}
                _ => {
                    return Err(invalid(format!(
                        "'{name}' in require_any must be a nullable parameter"
                    )));
                }
            }
        }

        if self.statement.shape == StatementShape::Select && !self.parameters.is_empty() {
            return Err(invalid("list statements take no parameters".to_string()));
        }
        Ok(())
    }
}

/// Project and dataset holding the record tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRef {
    pub project_id: String,
    pub dataset_id: String,
}

impl DatasetRef {
    pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
        }
    }

    fn table(&self, name: &'static str) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, name)
    }
}

/// Immutable catalog of all templates.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    dataset: DatasetRef,
    // Indexed by `Operation::index`.
    templates: Vec<QueryTemplate>,
}

impl TemplateRegistry {
    /// Builds and validates every template for `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidTemplate` if any template fails its
    /// self-check.
    pub fn new(dataset: DatasetRef) -> Result<Self, QueryError> {
        let templates: Vec<QueryTemplate> = Operation::ALL
            .iter()
            .map(|op| build_template(*op, &dataset))
            .collect();
        for template in &templates {
            template.validate()?;
        }
        tracing::debug!(
            project_id = %dataset.project_id,
            dataset_id = %dataset.dataset_id,
            templates = templates.len(),
            "Query templates registered"
        );
        Ok(Self { dataset, templates })
    }

    pub fn dataset(&self) -> &DatasetRef {
        &self.dataset
    }

    pub fn lookup(&self, operation: Operation) -> &QueryTemplate {
        &self.templates[operation.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryTemplate> {
        self.templates.iter()
    }
}

fn build_template(operation: Operation, dataset: &DatasetRef) -> QueryTemplate {
    use ScalarType::{Int64, Timestamp};

    match operation {
        Operation::CreatePatient => QueryTemplate::new(
            operation,
            Statement::insert(dataset.table(PATIENTS))
                .with_param("ROW_ID", "row_id")
                .with_param("SUBJECT_ID", "subject_id")
                .with_param("GENDER", "gender")
                .with_param("DOB", "dob"),
            vec![
                ParamSpec::nullable("row_id", Int64),
                ParamSpec::required("subject_id", Int64),
                ParamSpec::required("gender", ScalarType::String),
                ParamSpec::required("dob", Timestamp),
            ],
        ),
        Operation::UpdatePatient => QueryTemplate::new(
            operation,
            Statement::update(dataset.table(PATIENTS))
                .with_param("GENDER", "gender")
                .with_param("DOB", "dob")
                .with_filter("SUBJECT_ID", Expr::Param("subject_id")),
            vec![
                ParamSpec::required("gender", ScalarType::String),
                ParamSpec::required("dob", Timestamp),
                ParamSpec::required("subject_id", Int64),
            ],
        )
        .with_immutable(&["subject_id", "row_id"]),
        Operation::DeletePatient => QueryTemplate::new(
            operation,
            Statement::delete(dataset.table(PATIENTS))
                .with_filter("SUBJECT_ID", Expr::Param("subject_id")),
            vec![ParamSpec::required("subject_id", Int64)],
        ),
        Operation::CreateAdmission => QueryTemplate::new(
            operation,
            Statement::insert(dataset.table(ADMISSIONS))
                .with_param("SUBJECT_ID", "subject_id")
                .with_param("HADM_ID", "hadm_id")
                .with_param("ADMITTIME", "admittime")
                .with_param("ADMISSION_LOCATION", "admission_location"),
            vec![
                ParamSpec::required("subject_id", Int64),
                ParamSpec::required("hadm_id", Int64),
                ParamSpec::required("admittime", Timestamp),
                ParamSpec::required("admission_location", ScalarType::String),
            ],
        ),
        // A death ends the stay: deathtime, when present, is also the discharge time.
        Operation::UpdateAdmission => QueryTemplate::new(
            operation,
            Statement::update(dataset.table(ADMISSIONS))
                .with_assignment(
                    "DISCHTIME",
                    Expr::Coalesce(vec![Expr::Param("deathtime"), Expr::Param("dischtime")]),
                )
                .with_assignment(
                    "DEATHTIME",
                    Expr::Coalesce(vec![Expr::Param("deathtime"), Expr::Column("DEATHTIME")]),
                )
                .with_filter("HADM_ID", Expr::Param("hadm_id")),
            vec![
                ParamSpec::nullable("dischtime", Timestamp),
                ParamSpec::nullable("deathtime", Timestamp),
                ParamSpec::required("hadm_id", Int64),
            ],
        )
        .with_require_any(&["dischtime", "deathtime"])
        .with_immutable(&["hadm_id", "subject_id"]),
        Operation::CreateQuestion => QueryTemplate::new(
            operation,
            Statement::insert(dataset.table(QUESTIONS))
                .with_param("ID", "id")
                .with_param("PATIENT_ID", "patient_id")
                .with_param("MESSAGE", "message"),
            vec![
                ParamSpec::required("id", Int64),
                ParamSpec::required("patient_id", Int64),
                ParamSpec::required("message", ScalarType::String),
            ],
        ),
        Operation::CreateAnswer => QueryTemplate::new(
            operation,
            Statement::insert(dataset.table(ANSWERS))
                .with_param("REPLYING_TO", "replying_to")
                .with_param("UNIT_ID", "unit_id")
                .with_param("MESSAGE", "message"),
            vec![
                ParamSpec::required("replying_to", Int64),
                ParamSpec::required("unit_id", ScalarType::String),
                ParamSpec::required("message", ScalarType::String),
            ],
        ),
        Operation::ListPatients => QueryTemplate::new(
            operation,
            Statement::select(dataset.table(PATIENTS)).with_limit(LIST_LIMIT),
            vec![],
        ),
        Operation::ListQuestions => QueryTemplate::new(
            operation,
            Statement::select(dataset.table(QUESTIONS)).with_limit(LIST_LIMIT),
            vec![],
        ),
    }
}
