mod query;

pub use query::{collect_queries, execution_order, QuerySpec, QueryStageRunner};
