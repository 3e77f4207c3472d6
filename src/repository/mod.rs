pub mod cursor_repository;
pub mod database;
pub mod models;
pub mod traits;
pub mod tracking_repository;

pub use cursor_repository::CursorRepository;
pub use database::Database;
pub use models::{CursorRecord, TrackingRecord};
pub use traits::{CursorStore, SubscriptionStore};
pub use tracking_repository::{TrackingRepository, TrackingStats};
