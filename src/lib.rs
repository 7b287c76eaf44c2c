pub mod collaborators;
pub mod config;
pub mod control;
pub mod detector;
pub mod importer;
pub mod launcher;
pub mod log;
pub mod utils;
