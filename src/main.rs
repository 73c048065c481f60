//! warren — isolated parallel dev workspaces over one codebase.

use clap::Parser;

use warren::cli::Cli;
use warren::output::json;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = cli.run().await {
        if json_mode {
            // JSON consumers read stdout; fall back to plain stderr only
            // if the error object itself cannot be serialized.
            match json::format_error(&format!("{e:#}"), json::error_code(&e)) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("Error: {e:#}"),
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}
