// src/db/models/mod.rs

//! Data models for strata database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

mod append;
mod bbclass;
mod distro;
mod file_dependency;
mod inc_file;
mod layer_branch;
mod machine;
mod recipe;
mod update_run;

pub use append::BbAppend;
pub use bbclass::BbClass;
pub use distro::Distro;
pub use file_dependency::FileDependency;
pub use inc_file::IncFile;
pub use layer_branch::LayerBranch;
pub use machine::Machine;
pub use recipe::Recipe;
pub use update_run::UpdateRun;
