//! `weft config`: Print the configuration.

use weft_config::AppConfig;

pub fn show(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_config_renders_every_section() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "WEFT_AGENT_ID").then(|| "cli-agent".to_string()));

        let rendered = toml::to_string_pretty(&config).unwrap();
        for section in ["[agent]", "[persistence]", "[telemetry]", "[planner]"] {
            assert!(rendered.contains(section), "missing {section}");
        }
        assert!(rendered.contains("id = \"cli-agent\""));
        assert!(rendered.contains("backend = \"file\""));
    }
}
