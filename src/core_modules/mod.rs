pub mod argb_image;
pub mod blob;
pub mod blob_detector;
pub mod filters;
pub mod luminance_map;
pub mod sweep;
pub mod utils;
pub mod worker;
