pub mod geocoding;
pub mod text_model;
