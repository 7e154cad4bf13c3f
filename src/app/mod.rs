// Application layer: tasks, pipelines and their wiring from configuration.

pub mod context;
pub mod pipelines;
pub mod tasks;
