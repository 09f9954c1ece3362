use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static TRACTOR: Emoji<'_, '_> = Emoji("🚜 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_banner() {
    println!();
    println!("{} {}", TRACTOR, style("farmhand").bold().green());
    println!(
        "{}\n",
        style("Check-ins, farms, diamonds and tasks, account after account.").cyan()
    );
}

/// Header line printed before an account is processed, e.g.
/// `===== Account 2 | Alice =====`.
pub fn account_header(position: usize, name: &str) -> String {
    format!(
        "{} Account {} | {} {}",
        "=".repeat(5),
        position,
        style(name).green(),
        "=".repeat(5)
    )
}

/// A titled block of commands for the help screen.
pub struct GuideSection {
    title: &'static str,
    rows: Vec<(&'static str, &'static str)>,
}

impl GuideSection {
    pub fn new(title: &'static str) -> Self {
        Self {
            title,
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &'static str, description: &'static str) -> Self {
        self.rows.push((name, description));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(self.title).bold().underlined());
        let width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, description) in &self.rows {
            let padded = format!("{:width$}", name, width = width);
            println!("   {}  {}", style(padded).green(), description);
        }
    }
}
