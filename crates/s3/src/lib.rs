//! s3tk-s3: S3 SDK adapter for s3tk
//!
//! This crate implements the `ObjectStore` trait from s3tk-core on top of
//! aws-sdk-s3. It is the only crate that depends on the AWS SDK.

mod client;

pub use client::S3Client;
