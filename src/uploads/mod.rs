pub mod services;
pub mod staging;

pub use services::{UploadError, UploadGateway};
pub use staging::{StagedFile, Stager};
