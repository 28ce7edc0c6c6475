//! Query layer of the MIMIC record service.
//!
//! - [`template`]: the fixed catalog of parameterized statements
//! - [`binder`]: validation and coercion of request payloads into bound parameters
//! - [`executor`]: job submission, blocking until completion for mutating statements
//! - [`redeemer`]: bounded redemption of a job handle into rows

pub mod binder;
mod error;
pub mod executor;
pub mod redeemer;
pub mod template;

pub use binder::{bind, bind_with_identity};
pub use error::QueryError;
pub use executor::{ExecutionMode, ExecutorSettings, QueryExecutor};
pub use redeemer::{JobResultRedeemer, Redemption};
pub use template::{DatasetRef, Operation, ParamSpec, Presence, QueryTemplate, TemplateRegistry};

/// Result type for query layer operations.
pub type QueryResult<T> = Result<T, QueryError>;
