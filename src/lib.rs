//! Neurorack core — the audio side of a neural Eurorack module.
//!
//! A generative model turns control voltages from the front panel into a
//! mono audio stream, one block at a time, under a hard per-block deadline.
//! Hardware subsystems (rotary, CV, screen, button) run as their own worker
//! threads and talk to the engine through [`shared::SharedState`] plus one
//! [`signal::Signal`] per subsystem.

pub mod audio;
pub mod config;
pub mod model;
pub mod rack;
pub mod shared;
pub mod signal;
