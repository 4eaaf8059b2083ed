pub mod database;
pub mod results_sink;

pub use database::{create_db_pool, verify_schema, INSERT_CHANNEL, RESULTS_TABLE};
pub use results_sink::PgResultSink;
