pub mod batch;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod parsers;
pub mod plots;
pub mod query;
pub mod registry;
pub mod sources;
pub mod summary;

pub use batch::{ColumnType, TabularBatch};
pub use config::AppConfig;
pub use error::{DeckError, Result};
pub use query::{QueryGateway, QueryResult, Row};
pub use registry::{TableMeta, TableRegistry};
