//! Recording of signal values over a simulation, with CSV export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{FlowError, Result};
use crate::signal::{SignalId, SignalKind, SignalRegistry};

#[derive(Debug, Clone)]
struct Track {
    id: SignalId,
    name: String,
    /// Index of the first column belonging to this signal
    first: usize,
    width: usize,
}

/// Table of tracked signal values, one row per recorded step.
///
/// Arrays occupy one column per element; integers and booleans are stored
/// as `f64` (`true` is 1).
#[derive(Debug, Clone, Default)]
pub struct History {
    tracks: Vec<Track>,
    steps: Vec<usize>,
    time: Vec<f64>,
    columns: Vec<Vec<f64>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signal to the table.
    ///
    /// Tracking is closed once the first row is recorded. Tracking the same
    /// signal twice is a no-op.
    pub fn track(&mut self, signals: &SignalRegistry, id: SignalId) -> Result<()> {
        if !self.time.is_empty() {
            return Err(FlowError::invalid_config(
                "signals can only be tracked before the first update",
            ));
        }
        if self.tracks.iter().any(|tr| tr.id == id) {
            return Ok(());
        }
        let name = signals.name(id)?.to_string();
        let width = match signals.kind(id)? {
            SignalKind::Bus => return Err(FlowError::NotAValue { signal: name }),
            SignalKind::Array(n) => n,
            _ => 1,
        };
        let first = self.columns.len();
        self.columns.extend((0..width).map(|_| Vec::new()));
        self.tracks.push(Track { id, name, first, width });
        Ok(())
    }

    /// Append a row for step `k` at time `t`. Unassigned signals read as 0.
    pub fn update(&mut self, k: usize, t: f64, signals: &SignalRegistry) -> Result<()> {
        for tr in &self.tracks {
            let values = if signals.is_assigned(tr.id) {
                signals.get(tr.id)?.to_f64s()
            } else {
                vec![0.0; tr.width]
            };
            for (i, x) in values.into_iter().take(tr.width).enumerate() {
                self.columns[tr.first + i].push(x);
            }
        }
        self.steps.push(k);
        self.time.push(t);
        Ok(())
    }

    /// Number of recorded rows.
    pub fn nrows(&self) -> usize {
        self.time.len()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Step indices passed to [`update`](History::update).
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    /// Recorded values of a scalar signal, or the first element of an array.
    pub fn column(&self, id: SignalId) -> Option<&[f64]> {
        self.columns(id).and_then(|c| c.first()).map(Vec::as_slice)
    }

    /// One column per element of the tracked signal.
    pub fn columns(&self, id: SignalId) -> Option<&[Vec<f64>]> {
        let tr = self.tracks.iter().find(|tr| tr.id == id)?;
        Some(&self.columns[tr.first..tr.first + tr.width])
    }

    /// Write the table as CSV, with header `time,<name>,<name>[i]...`.
    pub fn export_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        let mut header = vec!["time".to_string()];
        for tr in &self.tracks {
            if tr.width == 1 {
                header.push(tr.name.clone());
            } else {
                header.extend((0..tr.width).map(|i| format!("{}[{i}]", tr.name)));
            }
        }
        writeln!(out, "{}", header.join(","))?;

        for (row, t) in self.time.iter().enumerate() {
            write!(out, "{t}")?;
            for col in &self.columns {
                write!(out, ",{}", col[row])?;
            }
            writeln!(out)?;
        }
        out.flush()
    }

    /// Write the table as CSV to `path`.
    pub fn export_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let to_error = |source| FlowError::FileWriteError {
            path: path.display().to_string(),
            source,
        };
        let file = File::create(path).map_err(to_error)?;
        self.export_csv(BufWriter::new(file)).map_err(to_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn registry() -> (SignalRegistry, SignalId, SignalId, SignalId) {
        let mut signals = SignalRegistry::new();
        let x = signals.register("/m~x", SignalKind::Scalar).unwrap();
        let v = signals.register("/m~v", SignalKind::Array(2)).unwrap();
        let on = signals.register("/m~on", SignalKind::Bool).unwrap();
        (signals, x, v, on)
    }

    #[test]
    fn test_rows_and_columns() {
        let (mut signals, x, v, on) = registry();
        let mut history = History::new();
        for id in [x, v, on] {
            history.track(&signals, id).unwrap();
        }

        signals.set_scalar(x, 1.5).unwrap();
        signals.set(v, DVector::from_vec(vec![2.0, 3.0])).unwrap();
        history.update(0, 0.0, &signals).unwrap();

        signals.clear_all();
        signals.set(on, true).unwrap();
        history.update(1, 0.5, &signals).unwrap();

        assert_eq!(history.nrows(), 2);
        assert_eq!(history.time(), &[0.0, 0.5]);
        assert_eq!(history.column(x).unwrap(), &[1.5, 0.0]);
        assert_eq!(history.columns(v).unwrap()[1], vec![3.0, 0.0]);
        assert_eq!(history.column(on).unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn test_track_closed_after_update() {
        let (signals, x, v, _) = registry();
        let mut history = History::new();
        history.track(&signals, x).unwrap();
        history.update(0, 0.0, &signals).unwrap();
        assert!(history.track(&signals, v).is_err());
    }

    #[test]
    fn test_bus_cannot_be_tracked() {
        let (mut signals, x, _, _) = registry();
        let bus = signals.register_bus("/m~bus", &[("x", x)]).unwrap();
        let mut history = History::new();
        assert!(matches!(
            history.track(&signals, bus),
            Err(FlowError::NotAValue { .. })
        ));
    }

    #[test]
    fn test_csv_layout() {
        let (mut signals, x, v, _) = registry();
        let mut history = History::new();
        history.track(&signals, x).unwrap();
        history.track(&signals, v).unwrap();
        signals.set_scalar(x, 2.0).unwrap();
        signals.set(v, DVector::from_vec(vec![0.5, -1.0])).unwrap();
        history.update(0, 0.25, &signals).unwrap();

        let mut out = Vec::new();
        history.export_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "time,/m~x,/m~v[0],/m~v[1]\n0.25,2,0.5,-1\n");
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let history = History::new();
        let err = history
            .export_csv_file("/nonexistent-dir/blockflow/history.csv")
            .unwrap_err();
        assert!(matches!(err, FlowError::FileWriteError { .. }));
    }
}
