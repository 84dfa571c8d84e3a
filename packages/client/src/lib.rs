//! Terminal direct-message client for Stoop.
//!
//! The client signs in against an OpenID Connect identity provider, keeps one
//! STOMP-over-WebSocket session to the chat backend, lists connected peers
//! and renders direct-message conversations.

// layers
pub mod api;
pub mod auth;
pub mod domain;
pub mod dto;
pub mod transport;
pub mod view;

// application
pub mod app;
pub mod config;
pub mod error;
