//! Runs registered patches against one method pool.

use std::collections::HashSet;

use dexpatch_pool::MethodPool;

use crate::context::{AppContext, PatchContext};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::options::{OptionValues, ResolvedOptions};
use crate::patch::PatchDescriptor;
use crate::scanner::{Request, Scanner};

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Patches executed by this run, in execution order.
    pub executed: Vec<String>,
    /// Patches in the order that an earlier run already executed.
    pub skipped: Vec<String>,
}

/// Owns the pool for the duration of patching.
///
/// Each patch runs at most once per session. Any failure aborts the run;
/// edits made by patches that already finished stay in the pool.
pub struct PatchSession {
    pool: MethodPool,
    app: AppContext,
    patches: Vec<PatchDescriptor>,
    graph: DependencyGraph,
    options: OptionValues,
    scanner: Scanner,
    executed: HashSet<String>,
}

impl PatchSession {
    pub fn new(pool: MethodPool, app: AppContext) -> Self {
        Self {
            pool,
            app,
            patches: Vec::new(),
            graph: DependencyGraph::new(),
            options: OptionValues::new(),
            scanner: Scanner::new(),
            executed: HashSet::new(),
        }
    }

    pub fn register(&mut self, patch: PatchDescriptor) -> Result<()> {
        self.graph
            .add(patch.name(), patch.dependencies().to_vec())?;
        self.patches.push(patch);
        Ok(())
    }

    /// Supplied option values. Later calls overlay earlier ones.
    pub fn set_options(&mut self, values: OptionValues) {
        self.options.merge(values);
    }

    pub fn pool(&self) -> &MethodPool {
        &self.pool
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn patches(&self) -> &[PatchDescriptor] {
        &self.patches
    }

    pub fn is_executed(&self, patch: &str) -> bool {
        self.executed.contains(patch)
    }

    /// `selected` and their dependencies, dependencies first.
    pub fn order(&self, selected: &[&str]) -> Result<Vec<String>> {
        self.graph.order_from(selected)
    }

    pub fn run_all(&mut self) -> Result<RunReport> {
        let names: Vec<String> = self.patches.iter().map(|p| p.name().to_string()).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.run(&names)
    }

    /// Run `selected` and everything they depend on.
    ///
    /// The order, option values and package compatibility of every patch
    /// involved are checked before the first one executes.
    pub fn run(&mut self, selected: &[&str]) -> Result<RunReport> {
        let order = self.order(selected)?;

        let mut plan = Vec::with_capacity(order.len());
        for name in &order {
            let index = self.position(name)?;
            let patch = &self.patches[index];
            let options = ResolvedOptions::resolve(name, patch.options(), &self.options)
                .and_then(|options| {
                    if patch.is_compatible_with(&self.app.package) {
                        Ok(options)
                    } else {
                        Err(Error::Incompatible {
                            patch: name.clone(),
                            package: self.app.package.clone(),
                        })
                    }
                })
                .map_err(|e| wrap(name, e))?;
            plan.push((index, options));
        }

        let mut report = RunReport::default();
        for (index, options) in plan {
            let name = self.patches[index].name().to_string();
            if self.executed.contains(&name) {
                log::debug!("{name} already applied");
                report.skipped.push(name);
                continue;
            }
            self.apply(index, &options).map_err(|e| wrap(&name, e))?;
            log::info!("applied {name}");
            self.executed.insert(name.clone());
            report.executed.push(name);
        }
        Ok(report)
    }

    pub fn into_pool(self) -> MethodPool {
        self.pool
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.patches
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| Error::UnknownPatch(name.to_string()))
    }

    fn apply(&mut self, index: usize, options: &ResolvedOptions) -> Result<()> {
        let Self {
            pool,
            app,
            patches,
            scanner,
            ..
        } = self;
        let patch = &patches[index];

        // Everything the patch declared is resolved before its first edit.
        let requests: Vec<Request<'_>> = patch
            .fingerprints()
            .iter()
            .map(|r| Request::new(&r.fingerprint, r.uniqueness))
            .collect();
        let results = scanner.resolve_many(pool, &requests);
        for (requirement, result) in patch.fingerprints().iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(Error::NotFound { fingerprint }) if requirement.optional => {
                    log::warn!("{}: optional fingerprint {fingerprint} not found", patch.name());
                }
                Err(e) => return Err(e),
            }
        }

        let Some(execute) = patch.executor() else {
            return Ok(());
        };
        let mut cx = PatchContext::new(patch.name(), pool, scanner, app, options, patch.fingerprints());
        execute(&mut cx)
    }
}

fn wrap(patch: &str, source: Error) -> Error {
    Error::Patch {
        patch: patch.to_string(),
        source: Box::new(source),
    }
}
