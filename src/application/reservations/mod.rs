pub mod expiry;
pub mod store;

pub use expiry::start_reservation_sweep_task;
pub use store::ReservationStore;
