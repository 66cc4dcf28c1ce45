// Library side of the clusterlock binary: configuration, startup and the
// command job, exposed so they can be tested without spawning the binary.

pub mod job; // External command run under the lock
pub mod model; // Configuration and its keys
pub mod startup; // Logging, storage and shutdown bootstrap

pub use job::{CommandJob, JobExit};
pub use model::Configuration;
