//! SQLite storage for workout sessions.

mod model;
mod repository;

pub use model::WorkoutSessionDB;
pub use repository::SessionRepository;
