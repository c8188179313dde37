//! Host-side WASI HTTP bridge implementation details.

// When building the project in release mode:
//   (1): Promote warnings into errors.
//   (2): Deny broken documentation links.
//   (3): Deny invalid codeblock attributes in documentation.
//   (4): Promote warnings in examples into errors, except for unused variables.
#![cfg_attr(not(debug_assertions), deny(warnings))]
#![cfg_attr(not(debug_assertions), deny(clippy::all))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::broken_intra_doc_links))]
#![cfg_attr(not(debug_assertions), deny(rustdoc::invalid_codeblock_attributes))]
#![cfg_attr(not(debug_assertions), doc(test(attr(deny(warnings)))))]
#![cfg_attr(not(debug_assertions), doc(test(attr(allow(dead_code)))))]
#![cfg_attr(not(debug_assertions), doc(test(attr(allow(unused_variables)))))]

pub mod abi;
pub mod body;
pub mod config;
pub mod error;
pub mod handles;
pub mod headers;
pub mod logging;
pub mod memory;
pub mod policy;
pub mod session;
pub mod upstream;

mod execute;
mod linking;

pub use {
    config::BridgeConfig,
    error::Error,
    execute::{ExecuteCtx, INCOMING_HANDLER_EXPORT},
    linking::WasmCtx,
    policy::Policy,
    session::Session,
};
