// Configuration loading
pub mod config;

// Identity provider seam and bearer token parsing
pub mod auth;

// Connection registry and group fan-out
pub mod broadcast;

// Vehicle route, motion model and tick scheduler
pub mod tracking;

// Private payment status notifications
pub mod payment;

// Room chat relay
pub mod chat;

// WebSocket sessions and wire protocol
pub mod subscription;

// HTTP and WebSocket APIs
pub mod api;
