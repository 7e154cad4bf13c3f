pub mod etl;

pub use crate::domain::model::{Frame, Record, TransformResult};
pub use crate::domain::ports::{Pipeline, SecretStore, Storage};
pub use crate::utils::error::Result;
