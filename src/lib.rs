pub mod app_config;
pub mod broadcast;
pub mod classifier;
pub mod constants;
pub mod db;
pub mod error;
pub mod ip;
pub mod middleware;
pub mod orm;
pub mod post;
pub mod rate_limit;
pub mod report;
pub mod sensitive;
pub mod session;
pub mod user;
pub mod web;
