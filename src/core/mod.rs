pub mod config;
pub mod constants;
pub mod geo;
pub mod map_view;
pub mod projection;
pub mod viewport;
