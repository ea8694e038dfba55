//! Orchestration over the stores: deleting and exporting instances.
//!
//! Both services resolve a partial key to identifiers with
//! [`resolve_instance_identifiers`](crate::core::resolve_instance_identifiers)
//! and then process each identifier independently. A failure on one
//! identifier is logged and reported in the result, never propagated, and
//! the remaining identifiers are still processed. Cancellation stops new
//! identifiers from starting; finished work is not rolled back.

mod delete;
mod export;
mod outcome;

pub use delete::{DeleteService, DeleteSummary};
pub use export::{
    CONTAINER_SAS_URI, ExportDestination, ExportProgress, ExportService, ExportSink, ExportSource,
    Instance, Series, Study,
};
pub use outcome::{ItemOutcome, ItemOutcomes};
