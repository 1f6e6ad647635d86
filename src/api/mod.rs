pub mod server;

pub use server::{ApiError, ApiServer, ISSUER_HEADER};
