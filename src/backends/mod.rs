/// Built-in codec libraries.
pub mod symphonia;
