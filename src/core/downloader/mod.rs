pub mod client;

pub use client::{DownloadRequest, DownloadTask, DownloadedFile, Downloader, DEFAULT_IDLE_TIMEOUT};
