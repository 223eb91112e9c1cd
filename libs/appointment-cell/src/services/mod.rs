pub mod booking;
pub mod consistency;
pub mod lifecycle;
pub mod locking;

pub use booking::BookingCoordinator;
pub use consistency::SchedulingConsistencyService;
pub use lifecycle::AppointmentLifecycleService;
pub use locking::{SlotGuard, SlotLockManager};
