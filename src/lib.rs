//! Semantic analysis for WGSL, the WebGPU Shading Language.
//!
//! A module is first [parsed](parse::parse) into a typed syntax tree, and then
//! [resolved](resolve::resolve): every name is bound, every expression typed, constant
//! expressions are evaluated and the rules of the language are checked. Problems are reported as
//! [`Diagnostics`](diagnostic::Diagnostics).

pub mod arena;
pub mod ast;
pub mod diagnostic;
pub mod parse;
pub mod resolve;
pub mod util;
