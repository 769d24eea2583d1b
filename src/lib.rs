//! Media relay library.
//!
//! An HTTP service that takes a video link (Google Drive, TikTok, Facebook,
//! YouTube, Instagram, Douyin, Bilibili, X/Twitter), downloads the video into
//! a local directory and hands back a link to fetch it from this service.

pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod fetcher;
pub mod identifier;
pub mod locks;
pub mod platforms;
pub mod storage;
pub mod sweeper;
pub mod web;
