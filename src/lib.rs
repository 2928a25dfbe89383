//! StayVista: villa-rental catalogue backend.
//!
//! Sled document store, a small query engine over JSON documents, booking-based
//! trending, admin submissions with image uploads, and an Axum REST API.

pub mod admin;
pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
// Filter/sort/limit over stored JSON documents
pub mod query;
pub mod rest;
pub mod storage;
pub mod trending;
