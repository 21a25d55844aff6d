//! `console-share` CLI
//!
//! Shares an Incus instance over TCP: a VM's graphical console (SPICE), an
//! interactive shell, or the text console.

pub mod commands;
pub mod viewer;
pub mod vga;
