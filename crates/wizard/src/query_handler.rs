//! Applies a request to a search query.
//!
//! Stages run in a fixed order: fields, includes, filters, sorts, then
//! appends are validated and every deferred relational refinement is
//! flushed into a single query hook on the search builder.

use std::sync::Arc;

use crate::config::WizardConfig;
use crate::error::{QueryKind, WizardError, WizardResult};
use crate::handlers::{HandlerContext, Refinement, RequestedFields};
use crate::record::ResultSet;
use crate::registry::AllowList;
use crate::relational::RelationalQuery;
use crate::request::RequestSnapshot;
use crate::search::{QueryHook, SearchBuilder};

/// What a wizard can be built around.
///
/// Only search queries are accepted; relational queries are rejected with
/// [`WizardError::InvalidSubject`].
pub enum Subject {
    Search(SearchBuilder),
    Relational(RelationalQuery),
}

impl From<SearchBuilder> for Subject {
    fn from(builder: SearchBuilder) -> Self {
        Subject::Search(builder)
    }
}

impl From<RelationalQuery> for Subject {
    fn from(query: RelationalQuery) -> Self {
        Subject::Relational(query)
    }
}

/// Owns the search query while one request is applied to it.
pub struct ScoutQueryHandler {
    subject: SearchBuilder,
    context: HandlerContext,
    allow: AllowList,
    request: RequestSnapshot,
    appends: Vec<String>,
    handled: bool,
}

impl ScoutQueryHandler {
    pub fn new(
        subject: impl Into<Subject>,
        request: RequestSnapshot,
        config: WizardConfig,
    ) -> WizardResult<Self> {
        let subject = match subject.into() {
            Subject::Search(builder) => builder,
            Subject::Relational(query) => {
                return Err(WizardError::InvalidSubject(format!(
                    "expected a search query, got a relational query over `{}`",
                    query.model().name()
                )));
            }
        };
        if subject.model().table().is_empty() {
            return Err(WizardError::InvalidSubject(format!(
                "model `{}` has no table",
                subject.model().name()
            )));
        }

        let allow = AllowList::new(subject.model().table(), config.count_suffix.clone());
        let context = HandlerContext::new(subject.schema().clone(), subject.model().clone(), config);

        Ok(Self {
            subject,
            context,
            allow,
            request,
            appends: Vec::new(),
            handled: false,
        })
    }

    pub fn subject(&self) -> &SearchBuilder {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut SearchBuilder {
        &mut self.subject
    }

    pub fn into_subject(self) -> SearchBuilder {
        self.subject
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    pub fn allow_list_mut(&mut self) -> &mut AllowList {
        &mut self.allow
    }

    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Queue a refinement of the relational hydration query.
    pub fn add_query_callback(
        &mut self,
        callback: impl Fn(&mut RelationalQuery) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.context.defer(callback);
    }

    /// Appends applied to results, once handled.
    pub fn appends(&self) -> &[String] {
        &self.appends
    }

    /// Apply the request. Runs at most once; later calls do nothing.
    pub fn handle(&mut self) -> WizardResult<()> {
        if self.handled {
            return Ok(());
        }
        self.handle_fields()?;
        self.handle_includes()?;
        self.handle_filters()?;
        self.handle_sorts()?;
        self.handle_appends()?;
        self.flush();
        self.handled = true;
        Ok(())
    }

    fn handle_fields(&mut self) -> WizardResult<()> {
        let requested = self.request.fields();
        let groups = if requested.is_empty() {
            self.allow.default_fields().clone()
        } else {
            self.allow.validate_fields(requested)?;
            requested.clone()
        };
        if groups.is_empty() {
            return Ok(());
        }

        if let Some(columns) = groups.get(self.allow.default_group()) {
            let columns: Vec<String> = columns
                .iter()
                .map(|column| self.allow.qualify_field(column))
                .collect();
            tracing::debug!(columns = ?columns, "selecting requested columns");
            self.context.defer(move |q| {
                q.select(columns.iter().cloned());
                Ok(())
            });
        }

        self.context.set_fields(RequestedFields::new(groups));
        Ok(())
    }

    fn handle_includes(&mut self) -> WizardResult<()> {
        let requested = self.request.includes();
        let includes = if requested.is_empty() {
            self.allow.default_includes().to_vec()
        } else {
            self.allow.validate(QueryKind::Include, requested)?;
            requested.to_vec()
        };

        for include in includes {
            let Some(handler) = self.allow.resolve_include(&include) else {
                tracing::debug!(include = %include, "default include is not allowed, skipping");
                continue;
            };
            let fields = self.context.fields().clone();
            self.context.defer(move |q| handler.handle(&fields, q));
        }
        Ok(())
    }

    fn handle_filters(&mut self) -> WizardResult<()> {
        let requested = self.request.filters().clone();

        if requested.is_empty() {
            for handler in self.allow.filters_with_defaults() {
                if let Some(value) = handler.default_value().cloned() {
                    tracing::debug!(filter = %handler.property().alias(), "applying default filter value");
                    handler.handle(&mut self.context, &mut self.subject, &value)?;
                }
            }
            return Ok(());
        }

        let aliases: Vec<&str> = requested.keys().map(String::as_str).collect();
        self.allow.validate(QueryKind::Filter, &aliases)?;

        for (alias, value) in &requested {
            if let Some(handler) = self.allow.resolve_filter(alias) {
                handler.handle(&mut self.context, &mut self.subject, value)?;
            }
        }
        Ok(())
    }

    fn handle_sorts(&mut self) -> WizardResult<()> {
        let requested = self.request.sorts();
        let sorts = if requested.is_empty() {
            self.allow.default_sorts().to_vec()
        } else {
            let fields: Vec<&str> = requested.iter().map(|s| s.field.as_str()).collect();
            self.allow.validate(QueryKind::Sort, &fields)?;
            requested.to_vec()
        };

        for sort in sorts {
            let Some(handler) = self.allow.resolve_sort(&sort.field) else {
                tracing::debug!(sort = %sort.field, "default sort is not allowed, skipping");
                continue;
            };
            handler.handle(&mut self.context, &mut self.subject, sort.direction)?;
        }
        Ok(())
    }

    fn handle_appends(&mut self) -> WizardResult<()> {
        let requested = self.request.appends();
        self.appends = if requested.is_empty() {
            self.allow.default_appends().to_vec()
        } else {
            self.allow.validate(QueryKind::Append, requested)?;
            requested.to_vec()
        };
        Ok(())
    }

    /// Attach one hook that runs every queued refinement in order, after any
    /// hook the search builder already carried.
    fn flush(&mut self) {
        let refinements: Vec<Refinement> = self.context.take_refinements();
        if refinements.is_empty() {
            return;
        }
        tracing::debug!(refinements = refinements.len(), "flushing relational refinements");

        let previous = self.subject.take_hook();
        let hook: QueryHook = Arc::new(move |query: &mut RelationalQuery| {
            if let Some(previous) = &previous {
                previous(query)?;
            }
            for refinement in &refinements {
                refinement(query)?;
            }
            Ok(())
        });
        self.subject.set_hook(hook);
    }

    /// Apply requested appends to every record in `result`.
    pub fn handle_result<R: ResultSet>(&self, mut result: R) -> WizardResult<R> {
        if !self.appends.is_empty() {
            for record in result.records_mut() {
                record.append(&self.appends)?;
            }
        }
        Ok(result)
    }
}
