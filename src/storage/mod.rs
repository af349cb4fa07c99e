mod schema;
mod state;
mod types;

pub use schema::StateStore;
pub use types::StorageError;
