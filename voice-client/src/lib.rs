//! Voice session client for the token service
//!
//! This crate provides:
//! - A session controller state machine with observable snapshots
//! - A token service client that supplies session credentials
//! - A LiveKit-backed media transport and a capture-device probe
//! - View models for the classic and avatar surfaces

pub mod client;
pub mod controller;
pub mod errors;
pub mod events;
pub mod livekit_transport;
pub mod microphone;
pub mod models;
pub mod state;
pub mod traits;
pub mod view;

pub use client::TokenServiceClient;
pub use controller::{ControllerOptions, SessionController};
pub use errors::*;
pub use events::*;
pub use livekit_transport::LiveKitTransport;
pub use microphone::SystemMicrophone;
pub use models::*;
pub use state::*;
pub use traits::*;
pub use view::{Surface, ViewModel};
