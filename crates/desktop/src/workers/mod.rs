pub mod channel_surface;
pub mod display_worker;
