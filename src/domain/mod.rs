pub mod commands;
pub mod errors;
pub mod events;
pub mod fine;
pub mod item;
pub mod loan;
pub mod member;
pub mod policy;
pub mod reservation;
pub mod value_objects;

pub use commands::*;
pub use errors::*;
pub use events::*;
pub use fine::{Fine, compute_fine, overdue_days};
pub use item::{Item, ItemChanges, ItemFormat, NewItem};
pub use loan::{Loan, LoanStatus};
pub use member::{Member, Role, check_capacity};
pub use policy::{LendingPolicy, LoanTerms, MAX_LOAN_PERIOD_DAYS};
pub use reservation::{Reservation, ReservationContext, ReservationStatus};
pub use value_objects::*;
