//! Explain command: describe what a native status code means

use modhost::{StatusBand, StatusCode, translate};
use owo_colors::OwoColorize;
use starbase::AppResult;

/// Run the explain command
pub fn run_explain(code: i32) -> AppResult {
    let status = StatusCode(code);
    println!("{} {}", "status:".bold(), status);

    match translate(status, "<context>") {
        None => println!("{} {}", "result:".bold(), "success".green()),
        Some(error) => {
            let band = StatusBand::of(code)
                .map(|band| band.to_string())
                .unwrap_or_else(|| "outside every band".to_string());
            println!("{} {}", "band:".bold(), band);
            println!("{} {:?}", "kind:".bold(), error.kind());
            println!("{} {}", "error:".bold(), error.to_string().red());
            if error.is_fatal() {
                println!("{}", "fatal: the host must be disposed".yellow());
            }
        }
    }

    Ok(None)
}
