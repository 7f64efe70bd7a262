pub mod config;
pub mod entry;
pub mod error;
pub mod flatten;
pub mod key;
pub mod metrics;
pub mod page;
pub mod retry;
pub mod store;
pub mod validator;

pub use config::Config;
pub use entry::{EditPolicy, Entry, EntryId, NewEntry, ReviewState};
pub use error::{Result, StoreError};
pub use key::TranslationKey;
pub use metrics::MetricsReport;
pub use page::{Page, PageRequest};
pub use store::{
    EntryStream, ItemOutcome, MergeReport, MergeRequest, MergedItem, NamespaceFilter,
    SearchPattern, TranslationStore,
};
pub use validator::{Field, FieldError, ValidationErrors};
