//! File Integrity CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the AIDE node daemon
//! and the status controller, plus the label/annotation vocabulary both
//! sides use to talk to each other.

pub mod annotations;
pub mod file_integrity;
pub mod labels;
pub mod node_status;

pub use annotations::*;
pub use file_integrity::*;
pub use labels::*;
pub use node_status::*;
