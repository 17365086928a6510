//! Cursos - course marketplace backend
//!
//! Users and bearer-token auth, Mercado Pago checkout, and reconciliation of
//! payment notifications arriving through provider redirects and webhooks.

pub mod activation;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod reconcile;
pub mod util;
