use anyhow::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Select};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Register,
    Farm,
    Stats,
    Exit,
}

const OPTIONS: &[(&str, MenuAction)] = &[
    ("Register accounts", MenuAction::Register),
    ("Farm points", MenuAction::Farm),
    ("Database stats", MenuAction::Stats),
    ("Exit", MenuAction::Exit),
];

pub fn print_banner(accounts: usize, proxies: usize) {
    println!();
    println!("{}", "  ███╗   ██╗███████╗ ██████╗████████╗ █████╗ ██████╗ ".yellow());
    println!("{}", "  ████╗  ██║██╔════╝██╔════╝╚══██╔══╝██╔══██╗██╔══██╗".yellow());
    println!("{}", "  ██╔██╗ ██║█████╗  ██║        ██║   ███████║██████╔╝".yellow());
    println!("{}", "  ██║╚██╗██║██╔══╝  ██║        ██║   ██╔══██║██╔══██╗".yellow());
    println!("{}", "  ██║ ╚████║███████╗╚██████╗   ██║   ██║  ██║██║  ██║".yellow());
    println!("{}", "  ╚═╝  ╚═══╝╚══════╝ ╚═════╝   ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝".yellow());
    println!();
    println!(
        "  {} accounts loaded | {} proxies",
        accounts.to_string().green(),
        proxies.to_string().green()
    );
    println!();
}

/// Blocking prompt; the caller runs it on the main task between batches.
pub fn select_action() -> Result<MenuAction> {
    let labels: Vec<&str> = OPTIONS.iter().map(|(label, _)| *label).collect();
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(OPTIONS[choice].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_is_the_last_option() {
        assert_eq!(OPTIONS.last().unwrap().1, MenuAction::Exit);
    }
}
