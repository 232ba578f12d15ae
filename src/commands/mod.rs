pub mod forecast;
pub mod import;
pub mod netbacks;
pub mod status;
