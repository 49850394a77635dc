//! Terminal colors and status lines.

use std::io::Write;

use owo_colors::OwoColorize;

const ACCENT: (u8, u8, u8) = (0x00, 0x52, 0x88);
const SUCCESS: (u8, u8, u8) = (0x8B, 0xC3, 0x4A);
const ERROR: (u8, u8, u8) = (0xF4, 0x43, 0x36);
const WARNING: (u8, u8, u8) = (0xFF, 0xC1, 0x07);
const INFO: (u8, u8, u8) = (0x21, 0x96, 0xF3);
const BOT: (u8, u8, u8) = (0xFB, 0xCF, 0xE8);

fn paint(text: &str, (r, g, b): (u8, u8, u8)) -> String {
    text.truecolor(r, g, b).to_string()
}

pub fn success(message: &str) {
    println!("{}", paint(&format!("✓ {message}"), SUCCESS));
}

pub fn info(message: &str) {
    println!("{}", paint(&format!("ℹ {message}"), INFO));
}

pub fn warning(message: &str) {
    eprintln!("{}", paint(&format!("⚠ {message}"), WARNING));
}

pub fn error(message: &str) {
    eprintln!("{}", paint(&format!("✗ {message}"), ERROR));
}

pub fn heading(text: &str) {
    println!("{}", text.white().bold());
}

pub fn subheading(text: &str) {
    println!("{}", text.bright_black().bold());
}

#[must_use]
pub fn highlight(text: &str) -> String {
    let (r, g, b) = ACCENT;
    text.truecolor(r, g, b).bold().to_string()
}

#[must_use]
pub fn dim(text: &str) -> String {
    text.bright_black().to_string()
}

/// Styled assistant text.
#[must_use]
pub fn bot(text: &str) -> String {
    paint(text, BOT)
}

/// Write a reply fragment without a newline and flush so it shows at once.
pub fn stream_fragment(text: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}", bot(text));
    let _ = out.flush();
}

/// Show the cursor again in case a prompt or spinner hid it.
pub fn restore_terminal() {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\x1b[?25h");
    let _ = out.flush();
}
