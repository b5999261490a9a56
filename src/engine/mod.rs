pub mod localstore;
pub mod persistence;

pub use localstore::LocalStore;
pub use persistence::Persistence;
