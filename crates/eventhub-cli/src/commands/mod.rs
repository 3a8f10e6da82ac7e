pub mod auth;
pub mod resources;
pub mod server;
pub mod settings;
