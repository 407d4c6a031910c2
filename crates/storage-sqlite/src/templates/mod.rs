//! SQLite storage for workout templates.

mod model;
mod repository;

pub use model::WorkoutTemplateDB;
pub use repository::TemplateRepository;
