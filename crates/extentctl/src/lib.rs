//! extentctl - command-line client for the extentfs extent server
//!
//! Stands in for a filesystem front end: `write` stores a file and prints its
//! recipe, `read` turns a recipe back into bytes, `poll` checks one extent.

pub mod commands;
