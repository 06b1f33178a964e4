use dap::types;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use url::Url;

use crate::engine::Engine;
use crate::range::{ClientCoordinates, ClientRange, Position, Range};

/// An engine location where execution can stop, in both coordinate spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointCandidate {
    pub id: i64,
    pub range: Range,
    pub client_range: ClientRange,
}

impl BreakpointCandidate {
    pub fn to_breakpoint(&self, source: &types::Source) -> types::Breakpoint {
        types::Breakpoint {
            id: Some(self.id),
            verified: true,
            message: None,
            source: Some(source.clone()),
            line: Some(self.client_range.line),
            column: Some(self.client_range.column),
            end_line: Some(self.client_range.end_line),
            end_column: Some(self.client_range.end_column),
            instruction_reference: None,
            offset: None,
        }
    }
}

impl ClientRange {
    pub fn to_location(&self) -> types::BreakpointLocation {
        types::BreakpointLocation {
            line: self.line,
            column: Some(self.column),
            end_line: Some(self.end_line),
            end_column: Some(self.end_column),
        }
    }
}

/// A breakpoint as the client asked for it, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedBreakpoint {
    pub line: i64,
    pub column: Option<i64>,
    pub end_line: Option<i64>,
    pub end_column: Option<i64>,
}

impl RequestedBreakpoint {
    pub fn line(line: i64) -> Self {
        Self {
            line,
            column: None,
            end_line: None,
            end_column: None,
        }
    }

    pub fn at(line: i64, column: i64) -> Self {
        Self {
            column: Some(column),
            ..Self::line(line)
        }
    }

    /// Source-space range a range breakpoint must contain the start of.
    ///
    /// `None` for line breakpoints, which match on line alone.
    pub fn target_range(&self, coords: &ClientCoordinates) -> Option<Range> {
        let column = self.column?;
        let start = Position::new(coords.line_to_source(self.line), coords.column_to_source(column));
        let end_line = coords.line_to_source(self.end_line.unwrap_or(self.line));
        let end_column = match (self.end_column, self.end_line) {
            (Some(end_column), _) => coords.column_to_source(end_column),
            (None, Some(_)) => u32::MAX,
            (None, None) => start.column,
        };

        Some(Range::new(start, Position::new(end_line, end_column)))
    }

    pub fn matches(&self, candidate: &BreakpointCandidate, coords: &ClientCoordinates) -> bool {
        if candidate.client_range.line != self.line {
            return false;
        }

        match self.target_range(coords) {
            Some(target) => target.contains(&candidate.range.start),
            None => true,
        }
    }
}

impl From<&types::SourceBreakpoint> for RequestedBreakpoint {
    fn from(bp: &types::SourceBreakpoint) -> Self {
        Self {
            line: bp.line,
            column: bp.column,
            end_line: None,
            end_column: None,
        }
    }
}

/// Resolves client breakpoint requests against engine-reported candidates.
///
/// Candidates are fetched once per source after each successful load and
/// shared read-only by every later request for that source.
#[derive(Debug, Default)]
pub struct BreakpointResolver {
    candidates: HashMap<Url, Vec<BreakpointCandidate>>,
    coords: ClientCoordinates,
}

impl BreakpointResolver {
    pub fn new(coords: ClientCoordinates) -> Self {
        Self {
            candidates: HashMap::new(),
            coords,
        }
    }

    pub fn set_coordinates(&mut self, coords: ClientCoordinates) {
        self.coords = coords;
        self.candidates.clear();
    }

    /// Drops every cached candidate list. Called whenever the program is (re)loaded.
    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    pub fn load_candidates(&mut self, engine: &mut dyn Engine, source: &Url) -> &[BreakpointCandidate] {
        let coords = self.coords;
        self.candidates.entry(source.clone()).or_insert_with(|| {
            match engine.breakpoints(source) {
                Ok(breakpoints) => {
                    debug!(source = %source, count = breakpoints.len(), "Loaded breakpoint candidates");
                    breakpoints
                        .into_iter()
                        .map(|bp| BreakpointCandidate {
                            id: bp.id,
                            range: bp.range,
                            client_range: coords.range_to_client(&bp.range),
                        })
                        .collect()
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Failed to load breakpoint candidates");
                    Vec::new()
                }
            }
        })
    }

    /// Every candidate matched by any of the requests. A request may match
    /// several candidates; unmatched requests are dropped.
    pub fn resolve(
        &mut self,
        engine: &mut dyn Engine,
        source: &Url,
        requested: &[RequestedBreakpoint],
    ) -> Vec<BreakpointCandidate> {
        let coords = self.coords;
        let candidates = self.load_candidates(engine, source);

        requested
            .iter()
            .flat_map(|request| {
                candidates
                    .iter()
                    .filter(move |candidate| request.matches(candidate, &coords))
                    .cloned()
            })
            .collect()
    }

    pub fn query(
        &mut self,
        engine: &mut dyn Engine,
        source: &Url,
        requested: &RequestedBreakpoint,
    ) -> Vec<ClientRange> {
        let coords = self.coords;
        self.load_candidates(engine, source)
            .iter()
            .filter(|candidate| requested.matches(candidate, &coords))
            .map(|candidate| candidate.client_range)
            .collect()
    }
}

/// Breakpoints currently armed, per source.
#[derive(Debug, Default)]
pub struct BreakpointSet {
    armed: BTreeMap<Url, Vec<BreakpointCandidate>>,
    deferred: BTreeMap<String, Vec<RequestedBreakpoint>>,
}

impl BreakpointSet {
    /// Replaces whatever was armed for `source`.
    pub fn replace(&mut self, source: Url, breakpoints: Vec<BreakpointCandidate>) {
        self.armed.insert(source, breakpoints);
    }

    /// Engine ids of every armed breakpoint across all sources.
    pub fn armed_ids(&self) -> Vec<i64> {
        self.armed.values().flatten().map(|bp| bp.id).collect()
    }

    /// Remembers a request for a source that cannot be resolved yet.
    pub fn defer(&mut self, path: String, requested: Vec<RequestedBreakpoint>) {
        self.deferred.insert(path, requested);
    }

    pub fn take_deferred(&mut self) -> Vec<(String, Vec<RequestedBreakpoint>)> {
        std::mem::take(&mut self.deferred).into_iter().collect()
    }
}
