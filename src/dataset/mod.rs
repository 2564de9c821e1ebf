//! Lead records, columnar frames and dataset loading.
//!
//! A [`LeadFrame`] tracks which raw columns were present in its source so the
//! preprocessor can tell a structurally broken dataset (missing column) from
//! ordinary missing values (imputed later).

mod input;
mod loader;
mod record;

pub use input::{InputError, Industry, LeadInput};
pub use loader::{DatasetError, LabeledFrame, load_csv, read_csv};
pub use record::{LeadFrame, LeadRecord};

/// Numeric modeling columns, in feature-vector order.
pub const NUMERIC_COLUMNS: [&str; 4] = [
    "company_size",
    "annual_revenue",
    "num_employees",
    "past_interactions",
];

/// Categorical modeling columns, in feature-vector order.
pub const CATEGORICAL_COLUMNS: [&str; 2] = ["industry", "lead_source"];

/// Raw columns every dataset must carry before any transform is valid.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "company_size",
    "annual_revenue",
    "num_employees",
    "industry",
    "lead_source",
    "past_interactions",
];

/// Identity column carried through but never modeled.
pub const COMPANY_NAME_COLUMN: &str = "company_name";

/// Binary conversion outcome column in labeled datasets.
pub const LABEL_COLUMN: &str = "converted";
