//! Scout Query Wizard
//!
//! Translates HTTP query parameters (`filter`, `sort`, `include`, `fields`,
//! `append`) into operations on a full-text search query, validated against
//! per-endpoint allow-lists. Relational work that a search engine cannot
//! express (eager loads, counts, projections, relation and scope filters) is
//! deferred and attached to the search as one hook over the relational query
//! that hydrates the search hits.
//!
//! The `scout-wizard` binary explains what a query string would do against a
//! TOML manifest.

pub mod config;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod query_handler;
pub mod record;
pub mod registry;
pub mod relational;
pub mod request;
pub mod schema;
pub mod search;
pub mod types;
pub mod value;
pub mod wizard;

pub use config::{ParameterNames, WizardConfig};
pub use error::{QueryKind, WizardError, WizardResult};
pub use handlers::{
    CallbackFilter, CallbackInclude, CallbackSort, ExactFilter, FieldSort, FilterHandler,
    HandlerContext, IncludeHandler, IncludedCount, IncludedRelationship, RequestedFields,
    ScopeFilter, SortHandler, TrashedFilter,
};
pub use query_handler::{ScoutQueryHandler, Subject};
pub use record::{Paginator, Record, Related, ResultSet};
pub use registry::{AllowList, AllowedFilter, AllowedInclude, AllowedSort, DefaultHandlers, ScoutDefaults};
pub use relational::{Constraint, RelationalQuery};
pub use request::RequestSnapshot;
pub use schema::{ModelSchema, Relation, RelationKind, Schema};
pub use search::{RecordStore, SearchBuilder, SearchEngine, SearchHits, Searchable};
pub use types::{Sort, SortDirection};
pub use value::FilterValue;
pub use wizard::{BuiltQuery, ScoutQueryWizard};
