mod art;
mod catalog;
mod profile;
mod tree;

pub use art::ArtCommands;
pub use catalog::CatalogCommands;
pub use profile::ProfileCommands;
pub use tree::TreeCommands;
