pub mod clock;
pub mod item_repository;
pub mod loan_repository;
pub mod member_repository;
pub mod reservation_repository;
pub mod store;

pub use clock::Clock;
pub use item_repository::ItemRepository;
pub use loan_repository::LoanRepository;
pub use member_repository::MemberRepository;
pub use reservation_repository::ReservationRepository;
pub use store::{Store, StoreError, UnitOfWork};
