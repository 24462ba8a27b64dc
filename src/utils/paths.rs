use anyhow::{Result, anyhow};
use std::path::PathBuf;

pub fn get_shop_list_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
    Ok(home.join(".shop-list"))
}

pub fn get_config_path() -> Result<PathBuf> {
    let dir = get_shop_list_dir()?;
    Ok(dir.join("config.toml"))
}

pub fn get_database_path() -> Result<PathBuf> {
    let dir = get_shop_list_dir()?;
    Ok(dir.join("items.db"))
}

pub fn get_logs_dir() -> Result<PathBuf> {
    let dir = get_shop_list_dir()?;
    Ok(dir.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_shop_list_dir() {
        let dir = get_shop_list_dir().unwrap();
        assert!(dir.ends_with(".shop-list"));
    }

    #[test]
    #[serial]
    fn test_files_live_under_app_dir() {
        let dir = get_shop_list_dir().unwrap();
        assert_eq!(get_config_path().unwrap(), dir.join("config.toml"));
        assert_eq!(get_database_path().unwrap(), dir.join("items.db"));
        assert_eq!(get_logs_dir().unwrap(), dir.join("logs"));
    }
}
