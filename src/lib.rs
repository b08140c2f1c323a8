//! SarasBlogg API - backend of a personal blog
//!
//! This library provides accounts with JWT authentication, posts with image
//! galleries, moderated comments, likes and the about/contact pages.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
