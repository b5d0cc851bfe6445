//! Asset server for a browser-embedded WebGL game build.
//!
//! Requests are routed in a fixed order: an optional `/api` reverse proxy,
//! the pre-compressed build artifacts (`*.js.br`, `*.wasm.br`,
//! `*.data.br`), literal files under the document root, and finally the
//! SPA entry document. A backend process can be supervised alongside.

pub mod args;
pub mod compression;
pub mod config;
pub mod error;
pub mod file_serving;
pub mod http;
pub mod logging;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod signals;
pub mod supervisor;
