#![no_std]
//! Board support for the nRF52840 pEMF driver board.

// Modules
mod board;

// Flatten
pub use board::*;

#[cfg(feature = "usb")]
pub mod usb;
