//! Stage composition
//!
//! A pass over one artifact category is a pipeline of small stages, each
//! returning whether the artifact should continue down the pipeline. Stages
//! share a [`Sinks`] context instead of reaching for global state.
//!
//! ```text
//! for_each_class ──► Filter ──► Unvisited ──► leak write ──► write ──► collect
//!                      │            │
//!                      └── false ───┴──► stop
//! ```

use std::sync::Arc;

use crate::writer::Sinks;

/// One step of a serialization pass
pub trait Stage<T: ?Sized> {
    /// Process `artifact`; `false` stops the pipeline for this artifact
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool;
}

impl<T: ?Sized, S: Stage<T> + ?Sized> Stage<T> for &mut S {
    #[inline]
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        (**self).apply(sinks, artifact)
    }
}

/// Absent stages pass everything through
impl<T: ?Sized, S: Stage<T>> Stage<T> for Option<S> {
    #[inline]
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        match self {
            Some(stage) => stage.apply(sinks, artifact),
            None => true,
        }
    }
}

/// Stage that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct Stub;

impl<T: ?Sized> Stage<T> for Stub {
    #[inline]
    fn apply(&mut self, _sinks: &mut Sinks<'_>, _artifact: &T) -> bool {
        true
    }
}

/// Run `second` only if `first` accepted the artifact
#[derive(Debug)]
pub struct Composite<F, G> {
    first: F,
    second: G,
}

impl<F, G> Composite<F, G> {
    /// Pair two stages
    pub fn new(first: F, second: G) -> Self {
        Self { first, second }
    }
}

impl<T: ?Sized, F: Stage<T>, G: Stage<T>> Stage<T> for Composite<F, G> {
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        self.first.apply(sinks, artifact) && self.second.apply(sinks, artifact)
    }
}

/// Ordered list of stages, stopping at the first that rejects
pub struct Chain<'s, T: ?Sized> {
    stages: Vec<Box<dyn Stage<T> + 's>>,
}

impl<'s, T: ?Sized> Chain<'s, T> {
    /// Create an empty chain
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage
    pub fn then(mut self, stage: impl Stage<T> + 's) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an already boxed stage
    pub fn then_boxed(mut self, stage: Box<dyn Stage<T> + 's>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the chain has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<T: ?Sized> Default for Chain<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Stage<T> for Chain<'_, T> {
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        self.stages
            .iter_mut()
            .all(|stage| stage.apply(sinks, artifact))
    }
}

/// Apply `inner` to a related artifact reached through a field
///
/// Artifacts without the field (a class with no package, a package in the
/// unnamed module) are skipped, not rejected.
pub struct Select<T: ?Sized, U, S> {
    project: fn(&T) -> Option<Arc<U>>,
    inner: S,
}

impl<T: ?Sized, U, S> Select<T, U, S> {
    /// Wrap `inner` behind `project`
    pub fn new(project: fn(&T) -> Option<Arc<U>>, inner: S) -> Self {
        Self { project, inner }
    }
}

impl<T: ?Sized, U, S: Stage<Arc<U>>> Stage<T> for Select<T, U, S> {
    fn apply(&mut self, sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        match (self.project)(artifact) {
            Some(target) => self.inner.apply(sinks, &target),
            None => true,
        }
    }
}

/// Predicate stage built from a closure
pub struct Filter<F>(pub F);

impl<T: ?Sized, F: FnMut(&T) -> bool> Stage<T> for Filter<F> {
    #[inline]
    fn apply(&mut self, _sinks: &mut Sinks<'_>, artifact: &T) -> bool {
        (self.0)(artifact)
    }
}
