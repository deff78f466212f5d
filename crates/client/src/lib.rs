//! MLIL Client - REST API client for the MLIL platform
//!
//! Wraps the platform's data store, variable store and prediction endpoints.
//! Every call authenticates with the user's credentials and fails with
//! [`ClientError::Api`] when the platform answers with an error status.
//!
//! # Example
//!
//! ```no_run
//! use mlil_client::{Credentials, MlilClient, VariableValue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MlilClient::new("http://localhost:4488", Credentials::new("alice", "key"))?;
//!
//! client
//!     .set_variable("threshold", &VariableValue::from(0.75), true)
//!     .await?;
//! let predictions = client.get_predictions("churn", "sklearn", "1").await?;
//! println!("{predictions}");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod endpoints;
mod error;
mod value;

pub use client::{ClientConfig, Credentials, MlilClient};
pub use error::{ClientError, ClientResult};
pub use value::VariableValue;
