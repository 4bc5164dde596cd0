// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-request context extraction.
//!
//! Request metadata is read from the host tables at most once per request,
//! on the first event that a driver accepts. Every later event of the same
//! request sees the same snapshot until [`RequestContextCache::reset`] runs
//! at the request boundary.

use crate::host::{EmptySource, RequestSource, TableKind};
use crate::registry::panic_message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Server table keys read during extraction.
pub mod keys {
    pub const REQUEST_URI: &str = "REQUEST_URI";
    pub const HTTP_HOST: &str = "HTTP_HOST";
    pub const HTTP_REFERER: &str = "HTTP_REFERER";
    pub const REQUEST_TIME: &str = "REQUEST_TIME";
    pub const SCRIPT_FILENAME: &str = "SCRIPT_FILENAME";
    pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
    pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
}

/// Which privacy-sensitive fields may be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyOptions {
    pub store_ip: bool,
    pub store_cookies: bool,
    pub store_post: bool,
}

impl Default for PrivacyOptions {
    fn default() -> Self {
        Self {
            store_ip: true,
            store_cookies: true,
            store_post: true,
        }
    }
}

/// Metadata describing the request an event was raised in.
///
/// `None` means the host did not provide the field, or provided it with an
/// unexpected type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub uri: Option<String>,
    pub host: Option<String>,
    pub referer: Option<String>,
    /// Request start as a Unix timestamp in seconds.
    pub request_time: Option<i64>,
    pub script_path: Option<String>,
    pub method: Option<String>,
    pub remote_ip: Option<String>,
    pub cookies: Option<String>,
    pub post_vars: Option<String>,
}

impl RequestContext {
    /// `request_time` as a UTC timestamp.
    pub fn request_datetime(&self) -> Option<DateTime<Utc>> {
        self.request_time
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }
}

/// Lazily filled, idempotent cache of the current request's context.
#[derive(Debug, Clone, Default)]
pub struct RequestContextCache {
    options: PrivacyOptions,
    initialized: bool,
    context: RequestContext,
}

impl RequestContextCache {
    /// Create an empty cache honouring `options`.
    pub fn new(options: PrivacyOptions) -> Self {
        Self {
            options,
            initialized: false,
            context: RequestContext::default(),
        }
    }

    /// Whether extraction already ran for the current request.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn options(&self) -> PrivacyOptions {
        self.options
    }

    /// Extract the context on first use; later calls return the cached copy
    /// without touching `source`.
    ///
    /// A source that panics while being read leaves every field absent for
    /// the rest of the request.
    pub fn extract(&mut self, source: &dyn RequestSource) -> &RequestContext {
        if self.initialized {
            tracing::trace!("Request context already initialized");
            return &self.context;
        }

        tracing::debug!("Extracting request context");
        self.initialized = true;
        let options = self.options;
        let read = panic::catch_unwind(AssertUnwindSafe(|| read_context(source, options)));
        self.context = match read {
            Ok(context) => context,
            Err(payload) => {
                tracing::warn!(
                    error = %panic_message(payload.as_ref()),
                    "Reading request tables failed, context left empty"
                );
                RequestContext::default()
            }
        };
        &self.context
    }

    /// The cached context, if extraction already ran for this request.
    pub fn cached(&self) -> Option<&RequestContext> {
        self.initialized.then_some(&self.context)
    }

    /// Forget everything extracted for the current request.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.context = RequestContext::default();
    }
}

/// State held for the request currently being handled: its host tables and
/// the context extracted from them.
pub struct RequestScope {
    source: Box<dyn RequestSource>,
    cache: RequestContextCache,
}

impl RequestScope {
    /// Scope over the given host tables, nothing extracted yet.
    pub fn new(source: Box<dyn RequestSource>, options: PrivacyOptions) -> Self {
        Self {
            source,
            cache: RequestContextCache::new(options),
        }
    }

    /// Scope with no host tables, used between requests.
    pub fn idle(options: PrivacyOptions) -> Self {
        Self::new(Box::new(EmptySource), options)
    }

    /// The request context, extracted on first call.
    pub fn context(&mut self) -> &RequestContext {
        self.cache.extract(self.source.as_ref())
    }

    /// The underlying cache, for inspecting what was extracted.
    pub fn cache(&self) -> &RequestContextCache {
        &self.cache
    }

    /// Start over with new host tables. Anything cached is dropped.
    pub fn replace_source(&mut self, source: Box<dyn RequestSource>) {
        self.source = source;
        self.cache.reset();
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn read_context(source: &dyn RequestSource, options: PrivacyOptions) -> RequestContext {
    let mut context = RequestContext::default();

    if let Some(server) = source.table(TableKind::Server) {
        let text = |key: &str| server.get_str(key).map(str::to_owned);

        context.uri = text(keys::REQUEST_URI);
        context.host = text(keys::HTTP_HOST);
        context.referer = text(keys::HTTP_REFERER);
        context.request_time = server.get_int(keys::REQUEST_TIME);
        context.script_path = text(keys::SCRIPT_FILENAME);
        context.method = text(keys::REQUEST_METHOD);

        if options.store_ip {
            context.remote_ip = text(keys::REMOTE_ADDR);
        }
    }

    if options.store_cookies {
        context.cookies = dump_non_empty(source, TableKind::Cookie);
    }

    if options.store_post {
        context.post_vars = dump_non_empty(source, TableKind::Post);
    }

    context
}

fn dump_non_empty(source: &dyn RequestSource, kind: TableKind) -> Option<String> {
    source
        .table(kind)
        .filter(|table| !table.is_empty())
        .map(|table| table.dump())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EmptySource, HostTable, StaticSource};

    fn server_table() -> HostTable {
        HostTable::new()
            .with(keys::REQUEST_URI, "/checkout?step=2")
            .with(keys::HTTP_HOST, "shop.example")
            .with(keys::HTTP_REFERER, "https://shop.example/cart")
            .with(keys::REQUEST_TIME, 1_700_000_000i64)
            .with(keys::SCRIPT_FILENAME, "/srv/www/index.src")
            .with(keys::REQUEST_METHOD, "POST")
            .with(keys::REMOTE_ADDR, "10.0.0.7")
    }

    fn full_source() -> StaticSource {
        StaticSource::new()
            .with_table(TableKind::Server, server_table())
            .with_table(TableKind::Cookie, HostTable::new().with("sid", "abc"))
            .with_table(TableKind::Post, HostTable::new().with("qty", "3"))
    }

    #[test]
    fn test_extract_all_fields() {
        let mut cache = RequestContextCache::new(PrivacyOptions::default());
        let context = cache.extract(&full_source()).clone();

        assert_eq!(context.uri.as_deref(), Some("/checkout?step=2"));
        assert_eq!(context.host.as_deref(), Some("shop.example"));
        assert_eq!(context.referer.as_deref(), Some("https://shop.example/cart"));
        assert_eq!(context.request_time, Some(1_700_000_000));
        assert_eq!(context.script_path.as_deref(), Some("/srv/www/index.src"));
        assert_eq!(context.method.as_deref(), Some("POST"));
        assert_eq!(context.remote_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(context.cookies.as_deref(), Some("Array\n(\n    [sid] => abc\n)\n"));
        assert_eq!(context.post_vars.as_deref(), Some("Array\n(\n    [qty] => 3\n)\n"));
        assert!(cache.is_initialized());
    }

    #[test]
    fn test_privacy_options_gate_sensitive_fields() {
        let options = PrivacyOptions {
            store_ip: false,
            store_cookies: false,
            store_post: false,
        };
        let mut cache = RequestContextCache::new(options);
        let context = cache.extract(&full_source());

        assert!(context.uri.is_some());
        assert!(context.remote_ip.is_none());
        assert!(context.cookies.is_none());
        assert!(context.post_vars.is_none());
    }

    #[test]
    fn test_missing_tables_and_wrong_shapes_are_absent() {
        let server = HostTable::new()
            .with(keys::REQUEST_URI, 12i64)
            .with(keys::REQUEST_TIME, "yesterday")
            .with(keys::REQUEST_METHOD, "GET");
        let source = StaticSource::new()
            .with_table(TableKind::Server, server)
            .with_table(TableKind::Cookie, HostTable::new());

        let mut cache = RequestContextCache::new(PrivacyOptions::default());
        let context = cache.extract(&source);

        assert_eq!(context.uri, None);
        assert_eq!(context.request_time, None);
        assert_eq!(context.method.as_deref(), Some("GET"));
        assert_eq!(context.cookies, None);
        assert_eq!(context.post_vars, None);

        let mut cache = RequestContextCache::default();
        assert_eq!(cache.extract(&EmptySource), &RequestContext::default());
    }

    #[test]
    fn test_reset_allows_fresh_extraction() {
        let mut cache = RequestContextCache::default();
        cache.extract(&full_source());
        assert!(cache.cached().is_some());

        cache.reset();
        assert!(!cache.is_initialized());
        assert!(cache.cached().is_none());

        let context = cache.extract(&EmptySource);
        assert_eq!(context.uri, None);
    }

    struct PanickingSource;

    impl RequestSource for PanickingSource {
        fn table(&self, _kind: TableKind) -> Option<&HostTable> {
            panic!("superglobals not bound");
        }
    }

    #[test]
    fn test_panicking_source_leaves_context_empty() {
        let mut cache = RequestContextCache::default();
        assert_eq!(cache.extract(&PanickingSource), &RequestContext::default());
        assert!(cache.is_initialized());

        // Still cached: the source is not read again for this request.
        assert_eq!(cache.extract(&full_source()).uri, None);
    }

    #[test]
    fn test_scope_replace_source_starts_over() {
        let mut scope = RequestScope::new(Box::new(PanickingSource), PrivacyOptions::default());
        assert_eq!(scope.context().uri, None);

        scope.replace_source(Box::new(full_source()));
        assert!(!scope.cache().is_initialized());
        assert_eq!(scope.context().uri.as_deref(), Some("/checkout?step=2"));
    }

    #[test]
    fn test_request_datetime() {
        let context = RequestContext {
            request_time: Some(0),
            ..Default::default()
        };
        assert_eq!(context.request_datetime().map(|d| d.timestamp()), Some(0));
        assert_eq!(RequestContext::default().request_datetime(), None);
    }
}
