//! Core module containing the bridge machinery
//!
//! This module provides:
//! - Line-oriented transport layer (serial, in-memory mock)
//! - Serial command channel with request/response correlation
//! - Broadcast registry fanning events out to live sinks
//! - Notification dispatcher resolving device ports to aliases
//! - TCP event server streaming JSON events to subscribers
//! - Service orchestration and shutdown handling

pub mod broadcast;
pub mod channel;
pub mod dispatcher;
pub mod event;
pub mod server;
pub mod service;
pub mod transport;
