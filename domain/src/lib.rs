pub mod error;
pub mod language_model;
pub mod models;
