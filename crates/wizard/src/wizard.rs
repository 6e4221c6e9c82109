//! Request-driven search query builder.
//!
//! ```ignore
//! let request = RequestSnapshot::from_query_str("filter[name]=John&sort=-id", &config);
//! let query = ScoutQueryWizard::for_subject(models.search(""), request)?
//!     .set_allowed_filters(["name"])
//!     .set_allowed_sorts(["id"])
//!     .build()?;
//! let records = query.get()?;
//! ```

use std::ops::Deref;
use std::sync::Arc;

use crate::config::WizardConfig;
use crate::error::WizardResult;
use crate::query_handler::{ScoutQueryHandler, Subject};
use crate::record::{Paginator, Record};
use crate::registry::{AllowList, AllowedFilter, AllowedInclude, AllowedSort, DefaultHandlers};
use crate::relational::RelationalQuery;
use crate::request::RequestSnapshot;
use crate::search::SearchBuilder;
use crate::types::Sort;

/// Configures allow-lists and defaults for one request, then builds the
/// search query.
pub struct ScoutQueryWizard {
    handler: ScoutQueryHandler,
}

impl ScoutQueryWizard {
    /// Wrap a search query with the default configuration.
    pub fn for_subject(subject: impl Into<Subject>, request: RequestSnapshot) -> WizardResult<Self> {
        Self::with_config(subject, request, WizardConfig::default())
    }

    pub fn with_config(
        subject: impl Into<Subject>,
        request: RequestSnapshot,
        config: WizardConfig,
    ) -> WizardResult<Self> {
        Ok(Self {
            handler: ScoutQueryHandler::new(subject, request, config)?,
        })
    }

    /// Replace the bare-name promotion strategy. Set it before the
    /// allow-lists it should apply to.
    pub fn set_default_handlers(mut self, defaults: Arc<dyn DefaultHandlers>) -> Self {
        self.handler.allow_list_mut().set_default_handlers(defaults);
        self
    }

    pub fn set_allowed_filters<T: Into<AllowedFilter>>(
        mut self,
        filters: impl IntoIterator<Item = T>,
    ) -> Self {
        self.handler.allow_list_mut().set_allowed_filters(filters);
        self
    }

    pub fn set_allowed_sorts<T: Into<AllowedSort>>(mut self, sorts: impl IntoIterator<Item = T>) -> Self {
        self.handler.allow_list_mut().set_allowed_sorts(sorts);
        self
    }

    pub fn set_allowed_includes<T: Into<AllowedInclude>>(
        mut self,
        includes: impl IntoIterator<Item = T>,
    ) -> Self {
        self.handler.allow_list_mut().set_allowed_includes(includes);
        self
    }

    pub fn set_allowed_fields<S: AsRef<str>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.handler.allow_list_mut().set_allowed_fields(fields);
        self
    }

    pub fn set_allowed_appends<S: AsRef<str>>(mut self, appends: impl IntoIterator<Item = S>) -> Self {
        self.handler.allow_list_mut().set_allowed_appends(appends);
        self
    }

    pub fn set_default_sorts<T: Into<Sort>>(mut self, sorts: impl IntoIterator<Item = T>) -> Self {
        self.handler.allow_list_mut().set_default_sorts(sorts);
        self
    }

    pub fn set_default_includes<S: AsRef<str>>(mut self, includes: impl IntoIterator<Item = S>) -> Self {
        self.handler.allow_list_mut().set_default_includes(includes);
        self
    }

    /// Default columns for a field group; an empty group means the
    /// searched model.
    pub fn set_default_fields<S: AsRef<str>>(
        mut self,
        group: &str,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.handler.allow_list_mut().set_default_fields(group, fields);
        self
    }

    pub fn set_default_appends<S: AsRef<str>>(mut self, appends: impl IntoIterator<Item = S>) -> Self {
        self.handler.allow_list_mut().set_default_appends(appends);
        self
    }

    /// Refine the relational hydration query. Callbacks run before the
    /// refinements the request produces.
    pub fn query(
        mut self,
        callback: impl Fn(&mut RelationalQuery) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.handler.add_query_callback(callback);
        self
    }

    pub fn allow_list(&self) -> &AllowList {
        self.handler.allow_list()
    }

    /// Validate the request and apply it to the search query.
    pub fn build(mut self) -> WizardResult<BuiltQuery> {
        self.handler.handle()?;
        Ok(BuiltQuery {
            handler: self.handler,
        })
    }
}

/// A search query with the request applied.
///
/// Terminal operations post-process their results with the requested
/// appends.
pub struct BuiltQuery {
    handler: ScoutQueryHandler,
}

impl BuiltQuery {
    pub fn search(&self) -> &SearchBuilder {
        self.handler.subject()
    }

    pub fn into_search(self) -> SearchBuilder {
        self.handler.into_subject()
    }

    /// Appends applied to results.
    pub fn appends(&self) -> &[String] {
        self.handler.appends()
    }

    pub fn get(&self) -> WizardResult<Vec<Record>> {
        let records = self.search().get()?;
        self.handler.handle_result(records)
    }

    pub fn first(&self) -> WizardResult<Option<Record>> {
        let record = self.search().first()?;
        self.handler.handle_result(record)
    }

    pub fn paginate(&self, per_page: usize, page: usize) -> WizardResult<Paginator> {
        let page = self.search().paginate(per_page, page)?;
        self.handler.handle_result(page)
    }

    pub fn simple_paginate(&self, per_page: usize, page: usize) -> WizardResult<Paginator> {
        let page = self.search().simple_paginate(per_page, page)?;
        self.handler.handle_result(page)
    }
}

impl Deref for BuiltQuery {
    type Target = SearchBuilder;

    fn deref(&self) -> &SearchBuilder {
        self.search()
    }
}
