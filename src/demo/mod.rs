//! Demo simulator: scripted conversations through the live pipeline.

mod scripts;
mod simulator;

pub use scripts::{template, ScriptLine, ScriptTemplate, TEMPLATES};
pub use simulator::DemoSimulator;
