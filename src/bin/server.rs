//! vidchat HTTP server.
//! Run with: cargo run --bin vidchat-server

use std::process::ExitCode;

use vidchat::start_vidchat;

fn main() -> ExitCode {
    start_vidchat::run()
}
