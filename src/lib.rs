pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod models;
pub mod services;
pub mod slug;
pub mod state;
pub mod storage;
pub mod validation;
pub mod webhook;
