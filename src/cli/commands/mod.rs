//! CLI command implementations

pub mod backup;
pub mod cache;
pub mod cleanup;
pub mod list;
pub mod manifest;
pub mod prune;
pub mod restore;
pub mod status;

pub use backup::execute as backup;
pub use cache::execute as cache;
pub use cleanup::execute as cleanup;
pub use list::execute as list;
pub use manifest::execute as manifest;
pub use prune::execute as prune;
pub use restore::execute as restore;
pub use status::execute as status;
