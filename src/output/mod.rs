use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn step(num: usize, total: usize, msg: &str) {
    println!(
        "{} {}",
        style(format!("[{}/{}]", num, total)).bold().cyan(),
        msg
    );
}

pub fn success(msg: &str) {
    println!("{} {}", style("✓").bold().green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").bold().red(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("!").bold().yellow(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("→").bold().blue(), msg);
}

pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Aligned `label: value` line for status views.
pub fn field(label: &str, value: &str) {
    println!("  {:<14} {}", style(format!("{}:", label)).dim(), value);
}

/// One planned change: what would happen to which resource.
pub fn planned(action: &str, resource: &str, note: &str) {
    let tag = match action {
        "create" => style(format!("{:<8}", action)).green(),
        "update" => style(format!("{:<8}", action)).yellow(),
        "blocked" => style(format!("{:<8}", action)).red(),
        _ => style(format!("{:<8}", action)).dim(),
    };
    if note.is_empty() {
        println!("  {} {}", tag, resource);
    } else {
        println!("  {} {} {}", tag, resource, style(format!("({})", note)).dim());
    }
}

/// Show at most the first and last few characters of a secret-looking value.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(3));
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}…{}", head, tail)
}
