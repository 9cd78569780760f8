//! Audit run: manifest → package records → one report row per installed package

pub mod collect;
pub mod context;
pub mod report;

pub use collect::collect_packages;
pub use context::AuditContext;
pub use report::{AuditError, Auditor, Cell, ReportRow};
