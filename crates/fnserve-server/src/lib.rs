pub mod admission;
pub mod dev;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod state;
pub mod stats;

pub use admission::{Admission, AdmissionSlot};
pub use dev::DevServer;
pub use registry::{FunctionInfo, FunctionRegistry};
pub use server::{build_router, Server};
pub use state::{AppState, ServerConfig};
pub use stats::{Stats, StatsSnapshot};
