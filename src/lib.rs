pub mod app;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod input;
pub mod mesh;
pub mod renderer;
pub mod scene;
pub mod shader_preprocessor;
pub mod time;

pub use app::{run, run_with_overrides, App};
