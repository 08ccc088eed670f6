//! # Monitor Hart Services
//!
//! Firmware core for the monitor hart of an asymmetric multi-core RISC-V SoC. The monitor brings
//! the worker harts out of reset and then serves their requests, with no operating system
//! underneath.
//!
//! Everything runs from one cooperative super-loop: the [`engine::Engine`] advances every
//! registered state machine exactly once per tick. Services talk to the worker harts only through
//! the [`ipi::Transport`], a set of bounded per-hart mailboxes that never block the sender.
//!
//! Hardware is reached through the collaborator traits in [`platform`], [`console`] and [`time`];
//! the bare-metal implementations live in `arch`.

#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]
// Strict safety enforcement
#![deny(clippy::not_unsafe_ptr_arg_deref)]
#![deny(clippy::cast_ptr_alignment)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]
#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod boot;
pub mod config;
pub mod console;
pub mod engine;
pub mod env;
pub mod hart;
pub mod init;
pub mod ipi;
pub mod logger;
pub mod platform;
pub mod services;
pub mod sm;
pub mod time;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use crate::engine::{Engine, InstanceHandle};
pub use crate::env::Env;
pub use crate::hart::HartId;
pub use crate::ipi::{Envelope, IntentKind, SendError, Transport};
