pub mod frame;
pub mod image;
pub mod region;

pub use frame::Frame;
pub use self::image::{Image, PixelFormat};
pub use region::{FaceRegion, PixelRect};
