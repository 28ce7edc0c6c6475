//! Structured statement model.
//!
//! A [`Statement`] is the shape of one parameterized warehouse statement.
//! Identifiers (tables, columns) are `&'static str` so they can only come from
//! code, never from a request; values are always referenced as named
//! parameters. [`Statement::to_sql`] renders the GoogleSQL text sent to
//! engines that take SQL, while engines that do not (the in-memory backend)
//! interpret the structure directly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of statement. Everything but `Select` mutates the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementShape {
    Insert,
    Update,
    Delete,
    Select,
}

impl StatementShape {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, StatementShape::Select)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementShape::Insert => "INSERT",
            StatementShape::Update => "UPDATE",
            StatementShape::Delete => "DELETE",
            StatementShape::Select => "SELECT",
        }
    }

    /// Maps a warehouse statement type (`SELECT`, `INSERT`, ...) to a shape.
    pub fn from_statement_type(statement_type: &str) -> Option<Self> {
        match statement_type.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(StatementShape::Insert),
            "UPDATE" => Some(StatementShape::Update),
            "DELETE" => Some(StatementShape::Delete),
            "SELECT" => Some(StatementShape::Select),
            _ => None,
        }
    }

    /// Infers the shape from the leading keyword of a SQL text.
    pub fn from_sql(sql: &str) -> Option<Self> {
        sql.split_whitespace()
            .next()
            .and_then(Self::from_statement_type)
    }
}

impl fmt::Display for StatementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-qualified table reference (`project.dataset.TABLE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: &'static str,
}

impl TableRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: &'static str) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Value expression used in assignments and filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Named query parameter (`@name`).
    Param(&'static str),
    /// Current value of a column of the target row.
    Column(&'static str),
    /// First non-null argument.
    Coalesce(Vec<Expr>),
}

impl Expr {
    fn collect_params(&self, out: &mut Vec<&'static str>) {
        match self {
            Expr::Param(name) => out.push(*name),
            Expr::Column(_) => {}
            Expr::Coalesce(args) => args.iter().for_each(|arg| arg.collect_params(out)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => write!(f, "@{name}"),
            Expr::Column(name) => f.write_str(name),
            Expr::Coalesce(args) => {
                let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "COALESCE({})", rendered.join(", "))
            }
        }
    }
}

/// `column = expr`, used for INSERT values and UPDATE SET clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: &'static str,
    pub value: Expr,
}

/// Equality predicate `column = expr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub shape: StatementShape,
    pub table: TableRef,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Filter>,
    pub limit: Option<u64>,
}

impl Statement {
    fn new(shape: StatementShape, table: TableRef) -> Self {
        Self {
            shape,
            table,
            assignments: Vec::new(),
            filter: None,
            limit: None,
        }
    }

    pub fn insert(table: TableRef) -> Self {
        Self::new(StatementShape::Insert, table)
    }

    pub fn update(table: TableRef) -> Self {
        Self::new(StatementShape::Update, table)
    }

    pub fn delete(table: TableRef) -> Self {
        Self::new(StatementShape::Delete, table)
    }

    pub fn select(table: TableRef) -> Self {
        Self::new(StatementShape::Select, table)
    }

    /// Adds an INSERT value or UPDATE SET assignment.
    pub fn with_assignment(mut self, column: &'static str, value: Expr) -> Self {
        self.assignments.push(Assignment { column, value });
        self
    }

    /// Shorthand for `with_assignment(column, Expr::Param(param))`.
    pub fn with_param(self, column: &'static str, param: &'static str) -> Self {
        self.with_assignment(column, Expr::Param(param))
    }

    pub fn with_filter(mut self, column: &'static str, value: Expr) -> Self {
        self.filter = Some(Filter { column, value });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parameter names referenced by the statement, in order of appearance.
    /// A parameter used twice is listed twice.
    pub fn referenced_params(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        for assignment in &self.assignments {
            assignment.value.collect_params(&mut out);
        }
        if let Some(filter) = &self.filter {
            filter.value.collect_params(&mut out);
        }
        out
    }

    /// Renders the statement as GoogleSQL with named parameters.
    pub fn to_sql(&self) -> String {
        let table = format!("`{}`", self.table);
        let where_clause = match &self.filter {
            Some(filter) => format!(" WHERE {} = {}", filter.column, filter.value),
            // UPDATE and DELETE require a WHERE clause in GoogleSQL.
            None if self.shape.is_mutating() => " WHERE TRUE".to_string(),
            None => String::new(),
        };

        match self.shape {
            StatementShape::Insert => {
                let columns: Vec<&str> = self.assignments.iter().map(|a| a.column).collect();
                let values: Vec<String> =
                    self.assignments.iter().map(|a| a.value.to_string()).collect();
                format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    columns.join(", "),
                    values.join(", ")
                )
            }
            StatementShape::Update => {
                let sets: Vec<String> = self
                    .assignments
                    .iter()
                    .map(|a| format!("{} = {}", a.column, a.value))
                    .collect();
                format!("UPDATE {table} SET {}{where_clause}", sets.join(", "))
            }
            StatementShape::Delete => format!("DELETE FROM {table}{where_clause}"),
            StatementShape::Select => {
                let limit = self
                    .limit
                    .map(|n| format!(" LIMIT {n}"))
                    .unwrap_or_default();
                format!("SELECT * FROM {table}{where_clause}{limit}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patients() -> TableRef {
        TableRef::new("proj", "MIMIC", "PATIENTS")
    }

    #[test]
    fn test_insert_sql() {
        let stmt = Statement::insert(patients())
            .with_param("SUBJECT_ID", "subject_id")
            .with_param("GENDER", "gender");
        assert_eq!(
            stmt.to_sql(),
            "INSERT INTO `proj.MIMIC.PATIENTS` (SUBJECT_ID, GENDER) VALUES (@subject_id, @gender)"
        );
    }

    #[test]
    fn test_update_sql_with_coalesce() {
        let stmt = Statement::update(TableRef::new("proj", "MIMIC", "ADMISSIONS"))
            .with_assignment(
                "DEATHTIME",
                Expr::Coalesce(vec![Expr::Param("deathtime"), Expr::Column("DEATHTIME")]),
            )
            .with_filter("HADM_ID", Expr::Param("hadm_id"));
        assert_eq!(
            stmt.to_sql(),
            "UPDATE `proj.MIMIC.ADMISSIONS` SET DEATHTIME = COALESCE(@deathtime, DEATHTIME) WHERE HADM_ID = @hadm_id"
        );
        assert_eq!(stmt.referenced_params(), vec!["deathtime", "hadm_id"]);
    }

    #[test]
    fn test_delete_and_select_sql() {
        let delete = Statement::delete(patients()).with_filter("SUBJECT_ID", Expr::Param("subject_id"));
        assert_eq!(
            delete.to_sql(),
            "DELETE FROM `proj.MIMIC.PATIENTS` WHERE SUBJECT_ID = @subject_id"
        );

        let select = Statement::select(patients()).with_limit(10);
        assert_eq!(select.to_sql(), "SELECT * FROM `proj.MIMIC.PATIENTS` LIMIT 10");

        let unfiltered = Statement::delete(patients());
        assert_eq!(unfiltered.to_sql(), "DELETE FROM `proj.MIMIC.PATIENTS` WHERE TRUE");
    }

    #[test]
    fn test_shape_from_sql() {
        assert_eq!(
            StatementShape::from_sql("  select * from t"),
            Some(StatementShape::Select)
        );
        assert_eq!(StatementShape::from_statement_type("DELETE"), Some(StatementShape::Delete));
        assert_eq!(StatementShape::from_statement_type("MERGE"), None);
        assert!(StatementShape::Update.is_mutating());
        assert!(!StatementShape::Select.is_mutating());
    }
}
