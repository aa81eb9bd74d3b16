use comfy_table::{Cell, Table};

use crate::error::{Result, TallyError};
use crate::settings::{load_settings, save_settings, Settings};

fn add_name(settings: &mut Settings, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TallyError::Settings("Name cannot be empty".to_string()));
    }
    if settings.roster.iter().any(|n| n == name) {
        return Err(TallyError::Settings(format!("{name} is already on the roster")));
    }
    settings.roster.push(name.to_string());
    Ok(())
}

fn remove_name(settings: &mut Settings, name: &str) -> Result<()> {
    let before = settings.roster.len();
    settings.roster.retain(|n| n != name.trim());
    if settings.roster.len() == before {
        return Err(TallyError::Settings(format!("{name} is not on the roster")));
    }
    Ok(())
}

fn set_initials(settings: &mut Settings, code: &str, name: &str) -> Result<()> {
    let code = code.trim().to_uppercase();
    if code.chars().count() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TallyError::Settings(format!(
            "Initials must be two letters, got {code:?}"
        )));
    }
    settings.initials.insert(code, name.trim().to_string());
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();

    let mut table = Table::new();
    table.set_header(vec!["#", "Name"]);
    for (i, name) in settings.roster.iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(name)]);
    }
    println!("Roster\n{table}");

    let mut table = Table::new();
    table.set_header(vec!["Initials", "Name"]);
    for (code, name) in &settings.initials {
        table.add_row(vec![Cell::new(code), Cell::new(name)]);
    }
    println!("Initials\n{table}");
    Ok(())
}

pub fn add(name: &str) -> Result<()> {
    let mut settings = load_settings();
    add_name(&mut settings, name)?;
    save_settings(&settings)?;
    println!("Added {}", name.trim());
    Ok(())
}

pub fn remove(name: &str) -> Result<()> {
    let mut settings = load_settings();
    remove_name(&mut settings, name)?;
    save_settings(&settings)?;
    println!("Removed {}", name.trim());
    Ok(())
}

pub fn initials(code: &str, name: &str) -> Result<()> {
    let mut settings = load_settings();
    set_initials(&mut settings, code, name)?;
    save_settings(&settings)?;
    println!("{} -> {}", code.trim().to_uppercase(), name.trim());
    Ok(())
}
