mod adjustments;
mod compose;
mod engine;
mod history;
mod netback;
mod run;
mod trends;
mod types;

pub use netback::NetbackTable;
pub use run::run;
pub use trends::build_trends;
pub use types::{ForecastRequest, ForecastTrends};
