pub mod computer;
pub mod driver;
pub mod installation_job;
