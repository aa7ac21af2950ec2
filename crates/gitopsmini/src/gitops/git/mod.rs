//! Git access for fetching application sources.

pub mod auth;
pub mod parse;
pub mod repository;

pub use auth::GitCredentials;
pub use repository::GitRepository;
