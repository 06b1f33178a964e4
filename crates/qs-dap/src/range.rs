use serde::{Deserialize, Serialize};

/// A 0-based position in a source file, as reported by the execution engine.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// Inclusive at both ends.
    pub fn contains(&self, position: &Position) -> bool {
        (self.start.line < position.line
            || (self.start.line == position.line && self.start.column <= position.column))
            && (self.end.line > position.line
                || (self.end.line == position.line && self.end.column >= position.column))
    }
}

/// Coordinate base negotiated with the client during `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCoordinates {
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
}

impl Default for ClientCoordinates {
    fn default() -> Self {
        Self {
            lines_start_at1: true,
            columns_start_at1: true,
        }
    }
}

impl ClientCoordinates {
    pub fn new(lines_start_at1: Option<bool>, columns_start_at1: Option<bool>) -> Self {
        Self {
            lines_start_at1: lines_start_at1.unwrap_or(true),
            columns_start_at1: columns_start_at1.unwrap_or(true),
        }
    }

    pub fn line_to_client(&self, line: u32) -> i64 {
        line as i64 + self.lines_start_at1 as i64
    }

    pub fn column_to_client(&self, column: u32) -> i64 {
        column as i64 + self.columns_start_at1 as i64
    }

    pub fn line_to_source(&self, line: i64) -> u32 {
        (line - self.lines_start_at1 as i64).max(0) as u32
    }

    pub fn column_to_source(&self, column: i64) -> u32 {
        (column - self.columns_start_at1 as i64).max(0) as u32
    }

    pub fn range_to_client(&self, range: &Range) -> ClientRange {
        ClientRange {
            line: self.line_to_client(range.start.line),
            column: self.column_to_client(range.start.column),
            end_line: self.line_to_client(range.end.line),
            end_column: self.column_to_client(range.end.column),
        }
    }
}

/// A range expressed in the client's coordinate base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientRange {
    pub line: i64,
    pub column: i64,
    pub end_line: i64,
    pub end_column: i64,
}
