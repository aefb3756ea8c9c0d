//! botcheck CLI
//!
//! Command-line front end for driving a conversational bot through its
//! scenario templates, either live in the browser or against a script.

pub mod commands;
pub mod output;
