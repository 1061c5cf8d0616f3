//! # pokerit-agent: screen agent
//!
//! Foreground process that periodically captures the local screen and
//! streams each image to the Pokerit analysis server over a WebSocket
//! bound to one session.
//!
//! ## Modes
//!
//! - **Console**: JSON commands on stdin, responses and server pushes on
//!   stdout (one object per line).
//! - **Autostart**: `--start` begins capturing right away, resuming the
//!   stored session unless `--session` names another. Capture keeps
//!   running after stdin closes, until Ctrl-C.

pub mod config;
pub mod service;
