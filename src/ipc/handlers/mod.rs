pub mod auth;
pub mod community;
pub mod core;
pub mod events;
pub mod files;
pub mod groups;
pub mod import;
pub mod journals;
pub mod settings;
pub mod stats;
pub mod teacher;
pub mod users;
