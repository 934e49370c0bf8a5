pub mod landing_zone;

pub use landing_zone::LandingZone;
