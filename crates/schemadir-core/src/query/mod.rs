//! Query results, the engine bridge and query targets.

mod execution;
mod proxy;
mod queryable;
mod result;

pub use execution::{EngineError, ErrorType, ExecutionResult, SourceLocation};
pub use proxy::SchemaProxy;
pub use queryable::Queryable;
pub use result::{ErrorLocation, QueryError, QueryResult};
