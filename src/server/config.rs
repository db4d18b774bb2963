use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub db_dir: PathBuf,
    pub drivers_dir: PathBuf,
    pub db_file: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let db_dir = data_dir.join("db");
        let drivers_dir = data_dir.join("drivers");

        Self {
            db_file: db_dir.join("driverhub.sqlite"),
            data_dir,
            db_dir,
            drivers_dir,
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("DRIVERHUB_DATA").unwrap_or_else(|_| "data".to_string());
        Self::new(data_dir)
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.data_dir, &self.db_dir, &self.drivers_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Connection string for the embedded store; DATABASE_URL overrides it.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}?mode=rwc", self.db_file.display()))
    }
}
