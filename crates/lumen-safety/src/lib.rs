pub mod audit;
pub mod classifier;
pub mod router;
pub mod sessions;

pub use audit::{AuditAction, AuditLogger, AuditRecord};
pub use classifier::{Classification, ContentClassifier, ContentLabel};
pub use router::{ClientKind, ContentRouter, Route, RouteConfig};
pub use sessions::{RouteSession, RouteSessionManager};
