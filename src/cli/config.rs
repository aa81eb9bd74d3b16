use comfy_table::{Cell, Table};
use zeroize::Zeroizing;

use crate::error::{Result, TallyError};
use crate::settings::{
    load_settings, save_settings, settings_location, shellexpand_path, Provider, Settings,
};

/// Show only the last four characters of a stored key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return "(not set)".to_string();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(8))
}

fn settings_table(settings: &Settings) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec![Cell::new("provider"), Cell::new(settings.provider)]);
    table.add_row(vec![Cell::new("api_key"), Cell::new(mask_key(&settings.api_key))]);
    table.add_row(vec![Cell::new("model"), Cell::new(&settings.model)]);
    table.add_row(vec![Cell::new("base_url"), Cell::new(&settings.base_url)]);
    table.add_row(vec![
        Cell::new("openai_api_key"),
        Cell::new(mask_key(&settings.openai_api_key)),
    ]);
    table.add_row(vec![Cell::new("openai_model"), Cell::new(&settings.openai_model)]);
    table.add_row(vec![Cell::new("openai_base_url"), Cell::new(&settings.openai_base_url)]);
    table.add_row(vec![Cell::new("workers"), Cell::new(settings.workers)]);
    let template = if settings.template_path.is_empty() {
        "(not set)"
    } else {
        settings.template_path.as_str()
    };
    table.add_row(vec![Cell::new("template_path"), Cell::new(template)]);
    table.add_row(vec![
        Cell::new("roster"),
        Cell::new(format!("{} names, {} initials", settings.roster.len(), settings.initials.len())),
    ]);
    table
}

pub fn show() -> Result<()> {
    let settings = load_settings();
    println!("{}", settings_location().display());
    println!("{}", settings_table(&settings));
    Ok(())
}

pub fn set_key(key: Option<&str>) -> Result<()> {
    let mut settings = load_settings();
    let key = match key {
        Some(k) => Zeroizing::new(k.trim().to_string()),
        None => Zeroizing::new(
            rpassword::prompt_password(format!("{} API key: ", settings.provider))?
                .trim()
                .to_string(),
        ),
    };
    if key.is_empty() {
        return Err(TallyError::Settings("API key cannot be empty".to_string()));
    }
    settings.set_stored_key(&key);
    save_settings(&settings)?;
    println!(
        "{} API key saved to {}",
        settings.provider,
        settings_location().display()
    );
    Ok(())
}

pub fn set_model(model: &str) -> Result<()> {
    let model = model.trim();
    if model.is_empty() {
        return Err(TallyError::Settings("Model name cannot be empty".to_string()));
    }
    let mut settings = load_settings();
    settings.set_active_model(model);
    save_settings(&settings)?;
    println!("{} model set to {model}", settings.provider);
    Ok(())
}

pub fn set_provider(provider: Provider) -> Result<()> {
    let mut settings = load_settings();
    settings.provider = provider;
    save_settings(&settings)?;
    println!("Provider set to {provider} (model {})", settings.active_model());
    Ok(())
}

pub fn set_template(path: &str) -> Result<()> {
    let resolved = shellexpand_path(path);
    if !resolved.is_file() {
        return Err(TallyError::Settings(format!(
            "No workbook found at {}",
            resolved.display()
        )));
    }
    let mut settings = load_settings();
    settings.template_path = resolved.to_string_lossy().to_string();
    save_settings(&settings)?;
    println!("Template set to {}", resolved.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(""), "(not set)");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("AIzaSyExample1234"), "********1234");
    }

    #[test]
    fn test_settings_table_hides_key() {
        let settings = Settings {
            api_key: "secret-value-9876".to_string(),
            ..Settings::default()
        };
        let rendered = settings_table(&settings).to_string();
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("9876"));
        assert!(rendered.contains("gemini-2.5-flash"));
        assert!(rendered.contains("22 names, 10 initials"));
        assert!(rendered.contains("gemini"));
        assert!(rendered.contains("gpt-4o"));
    }

    #[test]
    fn test_settings_table_hides_openai_key() {
        let settings = Settings {
            provider: Provider::OpenAi,
            openai_api_key: "sk-proj-secret-4321".to_string(),
            ..Settings::default()
        };
        let rendered = settings_table(&settings).to_string();
        assert!(!rendered.contains("sk-proj"));
        assert!(rendered.contains("4321"));
        assert!(rendered.contains("openai"));
    }
}
