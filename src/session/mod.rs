// src/session/mod.rs

pub mod engine;
pub mod service;

pub use engine::{Grade, SessionEngine, SessionError, SessionSnapshot, SessionState};
pub use service::SessionService;
