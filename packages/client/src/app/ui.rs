//! UI utilities for the client.

use std::io::Write;

/// Print rendered lines, then redisplay the prompt under them
pub fn print_lines(lines: &[String], prompt: &str) {
    if lines.is_empty() {
        return;
    }
    println!();
    for line in lines {
        println!("{}", line);
    }
    redisplay_prompt(prompt);
}

/// Redisplay the prompt after output arrived while reading a line
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}
