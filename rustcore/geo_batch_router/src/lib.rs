pub mod broadcaster;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geometry;
pub mod http;
pub mod model;
pub mod projection;
pub mod registry;
pub mod result_writer;
pub mod routing_client;
pub mod row_iterator;
pub mod upload_store;

pub use broadcaster::Broadcaster;
pub use config::Config;
pub use dispatcher::run as run_job;
pub use error::{ApiError, ApiResult};
pub use registry::Registry;
pub use routing_client::RoutingClient;
pub use upload_store::UploadStore;
