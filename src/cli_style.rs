use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;

pub fn get_styles() -> Styles {
    let heading = Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Cyan)));
    let green = Style::new()
        .bold()
        .fg_color(Some(Color::Ansi(AnsiColor::Green)));
    let red = Style::new()
        .bold()
        .fg_color(Some(Color::Ansi(AnsiColor::Red)));

    Styles::styled()
        .usage(heading)
        .header(heading)
        .literal(green)
        .valid(green)
        .invalid(red)
        .error(red)
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

/// Prints `key: value` lines with the keys aligned.
pub fn print_key_values(pairs: &[(&str, String)]) {
    let width = pairs.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in pairs {
        println!("  {:>width$}: {}", key, value, width = width);
    }
}

pub fn print_list<T: std::fmt::Display>(title: &str, items: &[T]) {
    println!("{} ({})", title, items.len());
    if items.is_empty() {
        println!("  (none)");
    }
    for item in items {
        println!("  - {}", item);
    }
}
