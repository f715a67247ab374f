//! A `#![no_std]` ordered structural equality checker for flattened
//! devicetrees
//!
//! Two DTBs are considered equal here when they describe the same tree
//! shape, the same node and property names, and the same property byte
//! values, *in the same physical order*, and carry identical memory
//! reservation tables. `FDT_NOP` padding tokens are transparent and may
//! differ freely between the two blobs.
//!
//! This is deliberately stricter than semantic equivalence: reordering
//! two sibling properties produces trees that mean the same thing but
//! compare unequal.
//!
//! ## Usage
//!
//! Create an [`Fdt`] from each `&[u8]` blob and run [`compare`]:
//!
//! ```no_run
//! use fdt_cmp::{compare, Fdt};
//!
//! let dtb1: &[u8]; // Get blobs from file/memory/...
//! let dtb2: &[u8];
//! # dtb1 = todo!();
//! # dtb2 = todo!();
//! let fdt1 = Fdt::from_bytes(dtb1).expect("Invalid FDT");
//! let fdt2 = Fdt::from_bytes(dtb2).expect("Invalid FDT");
//!
//! match compare(&fdt1, &fdt2) {
//!     Ok(()) => println!("Trees are equal"),
//!     Err(mismatch) => println!("{mismatch}"),
//! }
//! ```
//!
//! [`compare`] checks the reservation tables first, then walks both
//! structure blocks in lockstep. The returned [`CompareError`]
//! identifies the first point of divergence; there is no diff report
//! and no recovery past the first difference.
//!
//! The pieces are also usable on their own: [`compare_mem_rsv`] and
//! [`compare_structure`] run one half of the check each, and
//! [`Fdt::tokens`] gives a raw cursor over one blob's structure block.

#![warn(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(test), no_std)]

mod compare;
mod fdt;
mod token;

pub use compare::*;
pub use fdt::*;
pub use token::*;
