//! Surface Integrator
//!
//! Binds hardware and software control surfaces (MIDI, OSC and a vendor
//! bus) to the parameters of a host audio workstation through widget
//! definition files and zone files.

pub mod action;
pub mod broker;
pub mod compiler;
pub mod config;
pub mod error;
pub mod host;
pub mod io;
pub mod midi;
pub mod navigation;
pub mod page;
pub mod paths;
pub mod router;
pub mod session;
pub mod surface;
pub mod widget;
pub mod zone;
