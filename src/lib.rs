// Covercheck - Monthly data quality audit for pet insurance extracts
// Load the broker's CSV feed, normalize it, audit it, export parquet

pub mod checker;        // Referential, format and temporal rules
pub mod cleaner;        // Value coercion and canonical identifiers
pub mod config;         // One run, one input/output directory pair
pub mod entities;       // Contract, Receipt, Claim and Tariff tables
pub mod error;          // LoadError / CleanError / ExportError
pub mod exporter;       // Parquet + CSV + JSON artifacts, written atomically
pub mod loader;         // File discovery and CSV ingestion
pub mod logging;        // tracing subscriber setup
pub mod reconciliation; // Amount concordance rules
pub mod report;         // The run report artifact

// Re-export commonly used types
pub use checker::{QualityChecker, RuleReport, Severity, Violation};
pub use cleaner::{canonical_id, clean_dataset, CleanEntry, CleanLog, CoercionKind};
pub use config::{
    PipelineConfig, DEFAULT_COMPONENT_TOLERANCE, DEFAULT_TOLERANCE, MULTI_CONTRACT_DISCOUNT,
};
pub use entities::{
    Claim, CleanDataset, Contract, RawClaim, RawContract, RawDataset, RawReceipt, RawTable,
    RawTariff, Receipt, Tariff,
};
pub use error::{CleanError, CovercheckError, ExportError, LoadError, Result};
pub use exporter::{
    read_claims_parquet, read_contracts_parquet, read_receipts_parquet, read_tariffs_parquet,
    ArtifactEntry, ExportManifest, Exporter,
};
pub use loader::load_dataset;
pub use reconciliation::ReconciliationEngine;
pub use report::{RunReport, TableSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
