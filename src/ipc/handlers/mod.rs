pub mod admin;
pub mod auth;
pub mod core;
pub mod student;
pub mod teacher;
pub mod web;
