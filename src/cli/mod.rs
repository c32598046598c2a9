pub mod screen;
pub mod setup;
pub mod ui;
