pub mod art;
pub mod audit;
pub mod catalog;
pub mod dispatch;
pub mod profile;
pub mod shared;
pub mod tree;
