pub mod app;
pub mod sink;
