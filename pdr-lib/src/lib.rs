#![doc = include_str!("../README.md")]

mod error;

pub mod debayer;
pub mod decode;
pub mod fs;
pub mod image;
pub mod label;
pub mod pointer;
pub mod product;
pub mod registry;
pub mod table;

pub use error::{DecodeWarning, Error, Result};
pub use product::{open, read, ObjectValue, Options, Product};
