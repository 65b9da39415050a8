#![forbid(unsafe_code)]

pub mod chunk;
pub mod cli;
pub mod commands;
pub mod formats;
pub mod gateway;
pub mod gateway_client;
pub mod genai;
pub mod logging;
pub mod narrate;
pub mod page;
pub mod pipeline;
pub mod render;
pub mod request_log;
pub mod retry;
pub mod server;
pub mod slug;
pub mod store;
pub mod translate;
