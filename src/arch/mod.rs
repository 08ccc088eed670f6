//! Target glue. Host builds carry none: the library runs against the collaborator traits and
//! `main.rs` simulates the board.

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod riscv64;
