pub mod config;
pub mod error;

pub use config::{SchedulerConfig, load_dotenv};
pub use error::*;
