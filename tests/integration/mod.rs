//! Whole-pipeline properties over multi-file C programs.

mod common;

mod braces;
mod linkage;
mod mutation;
mod parity;
mod stack_heap;
