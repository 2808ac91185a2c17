pub mod context;
pub mod renderer;
