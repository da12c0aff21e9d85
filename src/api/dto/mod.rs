//! Data Transfer Objects for the diagnostics endpoints.

pub mod route_dto;

pub use route_dto::*;
