//! Statement interpreter for the in-memory tables.

use indexmap::IndexMap;
use mimic_warehouse::{
    BoundParameter, Expr, QueryRequest, ResultSet, Row, ScalarType, ScalarValue, Statement,
    StatementShape,
};

/// Rows of one table plus the column types seen so far.
#[derive(Debug, Default, Clone)]
pub struct Table {
    pub schema: IndexMap<String, ScalarType>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Records the type of a column on first non-null write and rejects later
    /// writes of a different type.
    fn check_column(&mut self, column: &str, value: &ScalarValue) -> Result<(), String> {
        let Some(ty) = value.scalar_type() else {
            return Ok(());
        };
        match self.schema.get(column) {
            Some(existing) if *existing != ty => Err(format!(
                "Value has type {ty} which cannot be inserted into column {column}, which has type {existing}"
            )),
            Some(_) => Ok(()),
            None => {
                self.schema.insert(column.to_string(), ty);
                Ok(())
            }
        }
    }
}

/// Checks that every parameter the statement references is bound.
pub fn validate(request: &QueryRequest) -> Result<(), String> {
    for name in request.statement.referenced_params() {
        if request.parameter(name).is_none() {
            return Err(format!("Query parameter '{name}' not found"));
        }
    }
    Ok(())
}

fn eval(expr: &Expr, row: Option<&Row>, params: &[BoundParameter]) -> Result<ScalarValue, String> {
    match expr {
        Expr::Param(name) => params
            .iter()
            .find(|p| p.name == *name)
            .map(|p| p.value.clone())
            .ok_or_else(|| format!("Query parameter '{name}' not found")),
        Expr::Column(column) => Ok(row
            .and_then(|r| r.get(*column))
            .cloned()
            .unwrap_or(ScalarValue::Null)),
        Expr::Coalesce(args) => {
            for arg in args {
                let value = eval(arg, row, params)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(ScalarValue::Null)
        }
    }
}

/// `column = value` with SQL semantics: NULL never matches.
fn matches(statement: &Statement, row: &Row, params: &[BoundParameter]) -> Result<bool, String> {
    let Some(filter) = &statement.filter else {
        return Ok(true);
    };
    let expected = eval(&filter.value, Some(row), params)?;
    let actual = row.get(filter.column).unwrap_or(&ScalarValue::Null);
    Ok(!expected.is_null() && !actual.is_null() && *actual == expected)
}

/// Executes a statement against a table, returning the rows of a select or an
/// empty set for mutating statements.
pub fn execute(
    statement: &Statement,
    params: &[BoundParameter],
    table: &mut Table,
) -> Result<ResultSet, String> {
    match statement.shape {
        StatementShape::Insert => {
            let mut row = Row::new();
            for assignment in &statement.assignments {
                let value = eval(&assignment.value, None, params)?;
                table.check_column(assignment.column, &value)?;
                row.insert(assignment.column.to_string(), value);
            }
            table.rows.push(row);
            Ok(ResultSet::default())
        }
        StatementShape::Update => {
            let mut updated = Vec::new();
            for (idx, row) in table.rows.iter().enumerate() {
                if !matches(statement, row, params)? {
                    continue;
                }
                // SET expressions see the row as it was before the update.
                let mut values = Vec::with_capacity(statement.assignments.len());
                for assignment in &statement.assignments {
                    values.push((assignment.column, eval(&assignment.value, Some(row), params)?));
                }
                updated.push((idx, values));
            }
            for (_, values) in &updated {
                for (column, value) in values {
                    table.check_column(column, value)?;
                }
            }
            for (idx, values) in updated {
                let row = &mut table.rows[idx];
                for (column, value) in values {
                    row.insert(column.to_string(), value);
                }
            }
            Ok(ResultSet::default())
        }
        StatementShape::Delete => {
            let mut keep = Vec::with_capacity(table.rows.len());
            for row in &table.rows {
                keep.push(!matches(statement, row, params)?);
            }
            let mut keep = keep.into_iter();
            table.rows.retain(|_| keep.next().unwrap_or(true));
            Ok(ResultSet::default())
        }
        StatementShape::Select => {
            let mut rows = Vec::new();
            for row in &table.rows {
                if statement.limit.is_some_and(|limit| rows.len() as u64 >= limit) {
                    break;
                }
                if matches(statement, row, params)? {
                    rows.push(row.clone());
                }
            }
            Ok(ResultSet::new(rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_warehouse::TableRef;

    fn param(name: &str, value: ScalarValue) -> BoundParameter {
        let ty = value.scalar_type().unwrap_or(ScalarType::String);
        BoundParameter::new(name, ty, value)
    }

    fn admissions() -> TableRef {
        TableRef::new("p", "MIMIC", "ADMISSIONS")
    }

    #[test]
    fn test_update_sees_pre_update_row() {
        let mut table = Table::default();
        let insert = Statement::insert(admissions())
            .with_param("HADM_ID", "hadm_id")
            .with_param("DEATHTIME", "deathtime");
        execute(
            &insert,
            &[
                param("hadm_id", ScalarValue::Int64(1)),
                param("deathtime", ScalarValue::String("old".into())),
            ],
            &mut table,
        )
        .unwrap();

        let update = Statement::update(admissions())
            .with_assignment(
                "DISCHTIME",
                Expr::Coalesce(vec![Expr::Param("deathtime"), Expr::Column("DEATHTIME")]),
            )
            .with_assignment(
                "DEATHTIME",
                Expr::Coalesce(vec![Expr::Param("deathtime"), Expr::Param("fallback")]),
            )
            .with_filter("HADM_ID", Expr::Param("hadm_id"));
        execute(
            &update,
            &[
                param("hadm_id", ScalarValue::Int64(1)),
                BoundParameter::new("deathtime", ScalarType::String, ScalarValue::Null),
                param("fallback", ScalarValue::String("new".into())),
            ],
            &mut table,
        )
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row["DISCHTIME"], ScalarValue::String("old".into()));
        assert_eq!(row["DEATHTIME"], ScalarValue::String("new".into()));
    }

    #[test]
    fn test_null_filter_matches_nothing() {
        let mut table = Table::default();
        table.rows.push(Row::from([("HADM_ID".to_string(), ScalarValue::Null)]));
        let delete = Statement::delete(admissions()).with_filter("HADM_ID", Expr::Param("hadm_id"));
        execute(
            &delete,
            &[BoundParameter::new("hadm_id", ScalarType::Int64, ScalarValue::Null)],
            &mut table,
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_column_type_conflict_fails() {
        let mut table = Table::default();
        let insert = Statement::insert(admissions()).with_param("HADM_ID", "hadm_id");
        execute(&insert, &[param("hadm_id", ScalarValue::Int64(1))], &mut table).unwrap();
        let err = execute(
            &insert,
            &[param("hadm_id", ScalarValue::String("one".into()))],
            &mut table,
        )
        .unwrap_err();
        assert!(err.contains("which has type INT64"));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_select_limit() {
        let mut table = Table::default();
        let insert = Statement::insert(admissions()).with_param("HADM_ID", "hadm_id");
        for id in 0..5 {
            execute(&insert, &[param("hadm_id", ScalarValue::Int64(id))], &mut table).unwrap();
        }
        let select = Statement::select(admissions()).with_limit(3);
        let result = execute(&select, &[], &mut table).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.rows[2]["HADM_ID"], ScalarValue::Int64(2));
    }
}
