pub mod catalog;
pub mod stream;
pub mod transcode;
