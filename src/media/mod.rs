pub mod image;
pub mod speech;

pub use image::ImageGenerator;
pub use speech::SpeechSynthesizer;
