//! Data Transfer Objects for the cluster API
//!
//! Wire shapes that are not domain entities: the response envelope, error
//! bodies and query parameters.

pub mod api;
pub mod task;
