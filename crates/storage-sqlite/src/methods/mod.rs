//! SQLite storage for method instances.

mod model;
mod repository;

pub use model::MethodInstanceDB;
pub use repository::MethodInstanceRepository;
