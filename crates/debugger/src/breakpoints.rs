//! Per-session breakpoint table.
//!
//! The table is the source of truth for *which lines* are wanted in each
//! file; the adapter is the source of truth for *verification* and ids.
//! Every mutation therefore sends the complete desired line list for the
//! touched file, and the cache is rebuilt from the adapter's positional
//! reply. When the adapter omits an id, the line's position in the request
//! array stands in for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::protocol::types::AdapterBreakpoint;

/// One breakpoint as the session knows it.
#[derive(Debug, Clone, Serialize)]
pub struct Breakpoint {
    pub id: i64,
    pub file: PathBuf,
    pub line: i64,
    pub verified: bool,
}

#[derive(Debug, Default)]
pub(crate) struct BreakpointTable {
    by_file: HashMap<PathBuf, Vec<Breakpoint>>,
}

impl BreakpointTable {
    /// Desired line list for `file` with `line` added. Existing order is
    /// preserved and the new line appended, so the adapter sees a stable
    /// positional layout; adding a line twice is a no-op.
    pub(crate) fn lines_with(&self, file: &Path, line: i64) -> Vec<i64> {
        let mut lines: Vec<i64> = self
            .by_file
            .get(file)
            .map(|bps| bps.iter().map(|b| b.line).collect())
            .unwrap_or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
        lines
    }

    /// Desired line list for `file` with `line` removed.
    pub(crate) fn lines_without(&self, file: &Path, line: i64) -> Vec<i64> {
        self.by_file
            .get(file)
            .map(|bps| {
                bps.iter()
                    .map(|b| b.line)
                    .filter(|&l| l != line)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rebuild the cache for `file` from the lines just sent and the
    /// adapter's reply, which corresponds to them by position.
    pub(crate) fn apply_reply(
        &mut self,
        file: &Path,
        lines_sent: &[i64],
        reply: &[AdapterBreakpoint],
    ) -> Vec<Breakpoint> {
        let entries: Vec<Breakpoint> = lines_sent
            .iter()
            .enumerate()
            .map(|(index, &line)| {
                let verdict = reply.get(index);
                Breakpoint {
                    id: verdict
                        .and_then(|v| v.id)
                        .unwrap_or(index as i64),
                    file: file.to_path_buf(),
                    line: verdict.and_then(|v| v.line).unwrap_or(line),
                    verified: verdict.map(|v| v.verified).unwrap_or(false),
                }
            })
            .collect();

        if entries.is_empty() {
            self.by_file.remove(file);
        } else {
            self.by_file.insert(file.to_path_buf(), entries.clone());
        }
        entries
    }

    pub(crate) fn for_file(&self, file: &Path) -> Vec<Breakpoint> {
        self.by_file.get(file).cloned().unwrap_or_default()
    }

    pub(crate) fn all(&self) -> Vec<Breakpoint> {
        let mut files: Vec<&PathBuf> = self.by_file.keys().collect();
        files.sort();
        files
            .into_iter()
            .flat_map(|f| self.by_file[f].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(id: Option<i64>, verified: bool) -> AdapterBreakpoint {
        AdapterBreakpoint {
            id,
            verified,
            line: None,
            message: None,
        }
    }

    #[test]
    fn lines_accumulate_in_insertion_order() {
        let mut table = BreakpointTable::default();
        let file = Path::new("/t/a.py");

        let lines = table.lines_with(file, 10);
        assert_eq!(lines, vec![10]);
        table.apply_reply(file, &lines, &[verdict(Some(1), true)]);

        let lines = table.lines_with(file, 20);
        assert_eq!(lines, vec![10, 20]);
        table.apply_reply(file, &lines, &[verdict(Some(1), true), verdict(Some(2), true)]);

        let lines = table.lines_without(file, 10);
        assert_eq!(lines, vec![20]);
    }

    #[test]
    fn duplicate_line_is_idempotent() {
        let mut table = BreakpointTable::default();
        let file = Path::new("/t/a.py");

        let lines = table.lines_with(file, 10);
        table.apply_reply(file, &lines, &[verdict(Some(1), true)]);

        assert_eq!(table.lines_with(file, 10), vec![10]);
        assert_eq!(table.for_file(file).len(), 1);
    }

    #[test]
    fn reply_ids_and_flags_win() {
        let mut table = BreakpointTable::default();
        let file = Path::new("/t/a.py");

        let entries = table.apply_reply(
            file,
            &[5, 99],
            &[verdict(Some(11), true), verdict(Some(12), false)],
        );

        assert_eq!(entries[0].id, 11);
        assert!(entries[0].verified);
        // Unverified entries are retained for later reconciliation.
        assert_eq!(entries[1].id, 12);
        assert!(!entries[1].verified);
        assert_eq!(table.for_file(file).len(), 2);
    }

    #[test]
    fn missing_id_falls_back_to_position() {
        let mut table = BreakpointTable::default();
        let file = Path::new("/t/a.py");

        let entries = table.apply_reply(file, &[3, 7], &[verdict(None, true), verdict(None, true)]);
        assert_eq!(entries[0].id, 0);
        assert_eq!(entries[1].id, 1);
    }

    #[test]
    fn emptied_file_is_dropped_from_the_table() {
        let mut table = BreakpointTable::default();
        let file = Path::new("/t/a.py");

        table.apply_reply(file, &[10], &[verdict(Some(1), true)]);
        table.apply_reply(file, &[], &[]);

        assert!(table.all().is_empty());
    }
}
