// Network adapter: the websocket client surface.

pub mod client;

pub use client::ws_handler;
