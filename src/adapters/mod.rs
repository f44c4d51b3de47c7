pub mod clock;
pub mod memory;
pub mod postgres;

pub use clock::{FixedClock, SystemClock};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
