//! Search Engine - one entry point for lexical, semantic and hybrid queries
//!
//! Owns the store, the scope resolver and the accelerator registry. Whether a
//! model is served by an accelerated index is settled in [`SearchEngineBuilder::build`]
//! (and [`SearchEngine::refresh`]), never per query.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::accel::{Acceleration, InMemoryIndex, SimilarityIndex};
use super::fusion::{rrf_fuse, RrfConfig};
use super::lexical::{self, QueryLimits};
use super::scope::{CacheStats, Clock, ScopeResolver, ScopeSets, SystemClock};
use super::semantic::{self, SemanticHit};
use super::snippet::preview;
use super::{MatchSource, SearchResult};
use crate::core::config::SearchConfig;
use crate::core::model::Scope;
use crate::core::paths::StorePaths;
use crate::error::{Error, Result};
use crate::storage::{ReadLimit, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Lexical,
    Semantic,
    Hybrid,
}

/// One query. `scope` of `None` searches the whole store.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub scope: Option<Scope>,
    pub mode: SearchMode,
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub model: Option<String>,
    pub k: usize,
}

impl SearchRequest {
    pub fn lexical(scope: Option<Scope>, text: impl Into<String>, k: usize) -> Self {
        Self {
            scope,
            mode: SearchMode::Lexical,
            text: Some(text.into()),
            vector: None,
            model: None,
            k,
        }
    }

    pub fn semantic(scope: Option<Scope>, vector: Vec<f32>, model: impl Into<String>, k: usize) -> Self {
        Self {
            scope,
            mode: SearchMode::Semantic,
            text: None,
            vector: Some(vector),
            model: Some(model.into()),
            k,
        }
    }

    pub fn hybrid(
        scope: Option<Scope>,
        text: impl Into<String>,
        vector: Vec<f32>,
        model: impl Into<String>,
        k: usize,
    ) -> Self {
        Self {
            scope,
            mode: SearchMode::Hybrid,
            text: Some(text.into()),
            vector: Some(vector),
            model: Some(model.into()),
            k,
        }
    }
}

pub struct SearchEngineBuilder {
    store: Store,
    config: SearchConfig,
    clock: Option<Arc<dyn Clock>>,
    indexes: Vec<Arc<dyn SimilarityIndex>>,
}

impl SearchEngineBuilder {
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for scope cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Serve `index.model()` from `index` instead of streaming.
    pub fn index(mut self, index: Arc<dyn SimilarityIndex>) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build(self) -> Result<SearchEngine> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let resolver = ScopeResolver::with_clock(self.config.scope_cache_ttl(), clock);

        let mut engine = SearchEngine {
            store: self.store,
            resolver,
            custom_indexes: self.indexes,
            accelerators: HashMap::new(),
            config: self.config,
        };
        engine.build_accelerators()?;
        Ok(engine)
    }
}

/// Search engine over one store
pub struct SearchEngine {
    store: Store,
    resolver: ScopeResolver,
    custom_indexes: Vec<Arc<dyn SimilarityIndex>>,
    accelerators: HashMap<String, Acceleration>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn builder(store: Store) -> SearchEngineBuilder {
        SearchEngineBuilder {
            store,
            config: SearchConfig::default(),
            clock: None,
            indexes: Vec::new(),
        }
    }

    /// Open the configured store and build an engine over it.
    pub fn open(paths: &StorePaths, config: SearchConfig) -> Result<Self> {
        let store = Store::open(&config.db_path(paths))?;
        Self::builder(store).config(config).build()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.resolver.stats()
    }

    /// Acceleration decision for `model`; `None` when none was requested.
    pub fn acceleration(&self, model: &str) -> Option<&Acceleration> {
        self.accelerators.get(model)
    }

    /// Resolve `scope` through the cache.
    pub fn resolve_scope(&self, scope: &Scope) -> Result<Arc<ScopeSets>> {
        self.resolver.resolve(&self.store, scope)
    }

    /// Drop cached scopes and rebuild in-memory indexes after the store changed.
    pub fn refresh(&mut self) -> Result<()> {
        self.resolver.invalidate_all();
        self.build_accelerators()
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        match request.mode {
            SearchMode::Lexical => {
                let text = required_text(request)?;
                self.search_lexical(text, request.scope.as_ref(), request.k, self.config.snippet_len)
            }
            SearchMode::Semantic => {
                let (vector, model) = required_vector(request)?;
                self.search_semantic(vector, model, request.scope.as_ref(), request.k)
            }
            SearchMode::Hybrid => {
                let text = required_text(request)?;
                let (vector, model) = required_vector(request)?;
                self.search_hybrid(text, vector, model, request.scope.as_ref(), request.k)
            }
        }
    }

    pub fn search_lexical(
        &self,
        query: &str,
        scope: Option<&Scope>,
        k: usize,
        snippet_len: usize,
    ) -> Result<Vec<SearchResult>> {
        let Some(query) = lexical::sanitize(query, QueryLimits::from(&self.config))? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let sets = self.resolve_optional(scope)?;
        lexical::search_lexical(self.store.conn(), &query, sets.as_deref(), k, snippet_len)
    }

    pub fn search_semantic(
        &self,
        query: &[f32],
        model: &str,
        scope: Option<&Scope>,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let sets = self.resolve_optional(scope)?;
        let hits = self.semantic_hits(query, model, sets.as_deref(), k)?;
        self.enrich(hits)
    }

    pub fn search_hybrid(
        &self,
        text: &str,
        query: &[f32],
        model: &str,
        scope: Option<&Scope>,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let fetch = k.saturating_mul(self.config.hybrid.oversample.max(1));
        let lexical = self.search_lexical(text, scope, fetch, self.config.snippet_len)?;
        let semantic = self.search_semantic(query, model, scope, fetch)?;
        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            "fusing hybrid results"
        );
        Ok(rrf_fuse(
            lexical,
            semantic,
            &RrfConfig::from(&self.config.hybrid),
            k,
        ))
    }

    fn resolve_optional(&self, scope: Option<&Scope>) -> Result<Option<Arc<ScopeSets>>> {
        scope.map(|scope| self.resolve_scope(scope)).transpose()
    }

    fn read_limit(&self) -> Result<ReadLimit> {
        ReadLimit::from_request(self.config.batch_size, self.config.allow_unbounded_reads)
    }

    fn semantic_hits(
        &self,
        query: &[f32],
        model: &str,
        sets: Option<&ScopeSets>,
        k: usize,
    ) -> Result<Vec<SemanticHit>> {
        if let Some(index) = self.accelerators.get(model).and_then(Acceleration::index) {
            if query.len() != index.dim() {
                return Err(Error::VectorFormat {
                    expected: index.dim(),
                    actual: query.len(),
                });
            }
            return Ok(index.search(query, k, &|doc| {
                sets.map_or(true, |sets| sets.admits(doc))
            }));
        }
        semantic::stream_search(&self.store, model, query, sets, k, self.read_limit()?)
    }

    /// Attach kind and a text preview. Nodes deleted since an index was built
    /// are dropped.
    fn enrich(&self, hits: Vec<SemanticHit>) -> Result<Vec<SearchResult>> {
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(node) = self.store.node_by_rowid(hit.node_rowid)? else {
                debug!(node_id = %hit.node_id, "semantic hit no longer in store");
                continue;
            };
            results.push(SearchResult {
                node_id: hit.node_id,
                node_rowid: hit.node_rowid,
                document_id: hit.document_id,
                kind: node.kind,
                score: hit.score,
                source: MatchSource::Semantic,
                snippet: preview(&node.text, self.config.snippet_len),
            });
        }
        Ok(results)
    }

    fn build_accelerators(&mut self) -> Result<()> {
        let mut accelerators = HashMap::new();
        for index in &self.custom_indexes {
            accelerators.insert(
                index.model().to_string(),
                Acceleration::Ready(Arc::clone(index)),
            );
        }

        for model in &self.config.accelerated_models {
            if accelerators.contains_key(model) {
                continue;
            }
            let acceleration = InMemoryIndex::build(
                &self.store,
                model,
                self.config.accelerated_max_vectors,
                self.read_limit()?,
            )?;
            if let Acceleration::Unavailable(reason) = &acceleration {
                warn!(
                    model = %model,
                    %reason,
                    "accelerated index unavailable, falling back to streaming search"
                );
            }
            accelerators.insert(model.clone(), acceleration);
        }

        self.accelerators = accelerators;
        Ok(())
    }
}

fn required_text(request: &SearchRequest) -> Result<&str> {
    request
        .text
        .as_deref()
        .ok_or_else(|| Error::InvalidQuery("query text is required".to_string()))
}

fn required_vector(request: &SearchRequest) -> Result<(&[f32], &str)> {
    match (&request.vector, &request.model) {
        (Some(vector), Some(model)) => Ok((vector.as_slice(), model.as_str())),
        _ => Err(Error::InvalidQuery(
            "query vector and model are required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::DocumentId;
    use crate::search::scope::ManualClock;
    use crate::test_support::{add_note, seed_vectors};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine(store: Store, config: SearchConfig) -> SearchEngine {
        SearchEngine::builder(store).config(config).build().unwrap()
    }

    fn scenario_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        seed_vectors(&store, "m", &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]);
        store
    }

    #[test]
    fn test_semantic_request_is_enriched() {
        let engine = engine(scenario_store(), SearchConfig::default());
        let results = engine
            .search(&SearchRequest::semantic(
                Some(Scope::project("brain")),
                vec![1.0, 0.0],
                "m",
                2,
            ))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node_id, "v0");
        assert_eq!(results[0].kind, "chunk");
        assert_eq!(results[0].source, MatchSource::Semantic);
        assert_eq!(results[0].snippet, "vector node 0");
        assert_eq!(results[1].node_id, "v2");
    }

    #[test]
    fn test_accelerated_matches_streaming() {
        let streaming = engine(scenario_store(), SearchConfig::default());
        let config = SearchConfig {
            accelerated_models: vec!["m".to_string()],
            ..SearchConfig::default()
        };
        let accelerated = engine(scenario_store(), config);
        assert!(matches!(
            accelerated.acceleration("m"),
            Some(Acceleration::Ready(_))
        ));

        let scope = Scope::project("brain");
        let a = streaming.search_semantic(&[0.2, 0.8], "m", Some(&scope), 3).unwrap();
        let b = accelerated.search_semantic(&[0.2, 0.8], "m", Some(&scope), 3).unwrap();
        let ids = |r: &[SearchResult]| r.iter().map(|x| x.node_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        for (x, y) in a.iter().zip(&b) {
            assert!((x.score - y.score).abs() < 1e-5);
        }
    }

    #[test]
    fn test_unavailable_acceleration_falls_back() {
        let config = SearchConfig {
            accelerated_models: vec!["m".to_string(), "missing".to_string()],
            accelerated_max_vectors: 2,
            ..SearchConfig::default()
        };
        let engine = engine(scenario_store(), config);
        assert!(matches!(
            engine.acceleration("m"),
            Some(Acceleration::Unavailable(_))
        ));
        assert!(matches!(
            engine.acceleration("missing"),
            Some(Acceleration::Unavailable(_))
        ));

        let results = engine
            .search_semantic(&[1.0, 0.0], "m", Some(&Scope::project("brain")), 2)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node_id, "v0");
    }

    struct CountingIndex {
        calls: AtomicUsize,
    }

    impl SimilarityIndex for CountingIndex {
        fn model(&self) -> &str {
            "m"
        }

        fn dim(&self) -> usize {
            2
        }

        fn len(&self) -> usize {
            1
        }

        fn search(
            &self,
            _query: &[f32],
            _k: usize,
            admit: &dyn Fn(DocumentId) -> bool,
        ) -> Vec<SemanticHit> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // v1 lives in the first document, row id 2.
            if !admit(1) {
                return Vec::new();
            }
            vec![SemanticHit {
                node_id: "v1".to_string(),
                node_rowid: 2,
                document_id: 1,
                score: 0.5,
            }]
        }
    }

    #[test]
    fn test_custom_index_is_used() {
        let index = Arc::new(CountingIndex {
            calls: AtomicUsize::new(0),
        });
        let engine = SearchEngine::builder(scenario_store())
            .index(index.clone())
            .build()
            .unwrap();

        let results = engine
            .search_semantic(&[1.0, 0.0], "m", Some(&Scope::project("brain")), 5)
            .unwrap();
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, "v1");
        assert_eq!(results[0].snippet, "vector node 1");

        let err = engine
            .search_semantic(&[1.0], "m", Some(&Scope::project("brain")), 5)
            .unwrap_err();
        assert!(matches!(err, Error::VectorFormat { .. }));
    }

    #[test]
    fn test_unbounded_batch_size_needs_opt_in() {
        let config = SearchConfig {
            batch_size: 0,
            ..SearchConfig::default()
        };
        let strict = engine(scenario_store(), config.clone());
        let err = strict
            .search_semantic(&[1.0, 0.0], "m", Some(&Scope::project("brain")), 2)
            .unwrap_err();
        assert!(matches!(err, Error::UnboundedRead(0)));

        let relaxed = engine(
            scenario_store(),
            SearchConfig {
                allow_unbounded_reads: true,
                ..config
            },
        );
        let results = relaxed
            .search_semantic(&[1.0, 0.0], "m", Some(&Scope::project("brain")), 2)
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_hybrid_fuses_both_sides() {
        let store = Store::open_in_memory().unwrap();
        add_note(&store, "brain", "gpu.md", "gpu memory sharing");
        add_note(&store, "brain", "cpu.md", "cpu caches");
        add_note(&store, "brain", "misc.md", "unrelated words");
        store.put_embedding("gpu.md#0", "m", &[0.0, 1.0]).unwrap();
        store.put_embedding("cpu.md#0", "m", &[1.0, 0.0]).unwrap();
        store.put_embedding("misc.md#0", "m", &[0.7, 0.7]).unwrap();
        let engine = engine(store, SearchConfig::default());

        let results = engine
            .search(&SearchRequest::hybrid(
                Some(Scope::project("brain")),
                "gpu",
                vec![0.0, 1.0],
                "m",
                2,
            ))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node_id, "gpu.md#0");
        assert_eq!(results[0].source, MatchSource::Hybrid);
        assert!(results[0].snippet.contains("**gpu**"));
        assert_eq!(results[1].node_id, "misc.md#0");
    }

    #[test]
    fn test_scope_cache_shared_across_queries() {
        let store = Store::open_in_memory().unwrap();
        add_note(&store, "brain", "a.md", "alpha");
        let clock = Arc::new(ManualClock::new());
        let engine = SearchEngine::builder(store)
            .clock(clock.clone())
            .build()
            .unwrap();
        let scope = Scope::project("brain");

        engine.search_lexical("alpha", Some(&scope), 5, 80).unwrap();
        engine.search_lexical("alpha", Some(&scope), 5, 80).unwrap();
        assert_eq!(engine.cache_stats().hits, 1);

        clock.advance(Duration::from_secs(61));
        engine.search_lexical("alpha", Some(&scope), 5, 80).unwrap();
        assert_eq!(engine.cache_stats().misses, 2);
    }

    #[test]
    fn test_refresh_sees_new_data() {
        let config = SearchConfig {
            accelerated_models: vec!["m".to_string()],
            ..SearchConfig::default()
        };
        let mut engine = engine(Store::open_in_memory().unwrap(), config);
        assert!(matches!(
            engine.acceleration("m"),
            Some(Acceleration::Unavailable(_))
        ));

        let scope = Scope::project("brain");
        assert!(engine.search_lexical("alpha", Some(&scope), 5, 80).unwrap().is_empty());

        add_note(engine.store(), "brain", "a.md", "alpha");
        engine.store().put_embedding("a.md#0", "m", &[1.0]).unwrap();
        // The empty scope stays cached until refreshed.
        assert!(engine.search_lexical("alpha", Some(&scope), 5, 80).unwrap().is_empty());
        engine.refresh().unwrap();

        assert!(matches!(engine.acceleration("m"), Some(Acceleration::Ready(_))));
        assert_eq!(
            engine
                .search_lexical("alpha", Some(&Scope::project("brain")), 5, 80)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_request_validation() {
        let engine = engine(scenario_store(), SearchConfig::default());
        let mut request = SearchRequest::lexical(Some(Scope::project("brain")), "x", 5);
        request.mode = SearchMode::Semantic;
        assert!(matches!(engine.search(&request), Err(Error::InvalidQuery(_))));

        request.mode = SearchMode::Lexical;
        request.text = None;
        assert!(matches!(engine.search(&request), Err(Error::InvalidQuery(_))));

        let too_long = SearchRequest::lexical(Some(Scope::project("brain")), "a ".repeat(40), 5);
        assert!(matches!(engine.search(&too_long), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_zero_k_and_empty_query() {
        let engine = engine(scenario_store(), SearchConfig::default());
        let scope = Scope::project("brain");
        assert!(engine.search_lexical("vector", Some(&scope), 0, 80).unwrap().is_empty());
        assert!(engine.search_lexical("  ", Some(&scope), 5, 80).unwrap().is_empty());
        assert!(engine
            .search_semantic(&[1.0, 0.0], "m", Some(&scope), 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unscoped_requests_search_everything() {
        let store = Store::open_in_memory().unwrap();
        add_note(&store, "brain", "a.md", "config for brain");
        add_note(&store, "work", "b.md", "config for work");
        store.put_embedding("a.md#0", "m", &[1.0, 0.0]).unwrap();
        store.put_embedding("b.md#0", "m", &[0.0, 1.0]).unwrap();
        let streaming = engine(store, SearchConfig::default());

        let lexical = streaming
            .search(&SearchRequest::lexical(None, "config", 10))
            .unwrap();
        assert_eq!(lexical.len(), 2);
        assert_eq!(streaming.cache_stats().misses, 0);

        let semantic = streaming
            .search(&SearchRequest::semantic(None, vec![0.0, 1.0], "m", 10))
            .unwrap();
        let ids: Vec<&str> = semantic.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["b.md#0", "a.md#0"]);

        let scoped = streaming
            .search(&SearchRequest::semantic(
                Some(Scope::project("brain")),
                vec![0.0, 1.0],
                "m",
                10,
            ))
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].node_id, "a.md#0");
    }

    #[test]
    fn test_unscoped_accelerated_search() {
        let store = Store::open_in_memory().unwrap();
        add_note(&store, "brain", "a.md", "alpha");
        add_note(&store, "work", "b.md", "beta");
        store.put_embedding("a.md#0", "m", &[1.0, 0.0]).unwrap();
        store.put_embedding("b.md#0", "m", &[0.6, 0.4]).unwrap();
        let config = SearchConfig {
            accelerated_models: vec!["m".to_string()],
            ..SearchConfig::default()
        };
        let engine = engine(store, config);
        assert!(matches!(engine.acceleration("m"), Some(Acceleration::Ready(_))));

        let results = engine.search_semantic(&[1.0, 0.0], "m", None, 5).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md#0", "b.md#0"]);
    }
}
