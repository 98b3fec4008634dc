mod client;
mod error;

pub use client::{
    BasicQueryInfo, Column, PrestoClient, QueryErrorInfo, SessionInfo, StatementPage,
    StatementStats, CATALOG_HEADER, SCHEMA_HEADER, SESSION_HEADER, USER_HEADER,
};
pub use error::{PrestoHttpError, PrestoHttpErrorKind};
