mod rows;
mod store;

pub use store::{PgStore, PgUnitOfWork, map_sqlx_error};
