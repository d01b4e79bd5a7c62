pub mod config;
pub mod filter;

pub use self::config::BlurConfig;
pub use filter::{kernel_radius, BlurPatch, RegionBlurFilter};
