mod client;

pub use client::{ApiErrorClass, UploadDescriptor, WavelineClient, WavelineError};
