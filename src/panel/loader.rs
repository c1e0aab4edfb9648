//! Load per-wave CSV extracts into a panel and write panels back out
//!
//! Every extract carries the key columns `pidp`, `hidp`, `time` and
//! `weight`; all other columns are attributes of the harmonized schema.

use super::data::{ColumnSpec, Observation, Panel, Schema};
use super::value::{ColumnKind, MissingCode, Value};
use crate::error::{PanelError, Result};
use csv::{Reader, StringRecord, Writer};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PIDP: &str = "pidp";
pub const HIDP: &str = "hidp";
pub const TIME: &str = "time";
pub const WEIGHT: &str = "weight";

const KEY_COLUMNS: [&str; 4] = [PIDP, HIDP, TIME, WEIGHT];

/// Declared column kinds; columns not listed are inferred
pub type ColumnKinds = BTreeMap<String, ColumnKind>;

/// File name of one wave inside a data directory
pub fn wave_path(dir: &Path, year: i32) -> PathBuf {
    dir.join(format!("{}_US_cohort.csv", year))
}

/// One parsed extract before kinds are settled
struct RawExtract {
    source: PathBuf,
    columns: Vec<String>,
    keys: Vec<(i64, i64, i32, f64)>,
    cells: Vec<Vec<Value>>,
    bad_weights: usize,
}

fn parse_id(field: &str, raw: &str, source: &Path) -> Result<i64> {
    let t = raw.trim();
    t.parse::<i64>()
        .ok()
        .or_else(|| t.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| PanelError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            path: source.to_path_buf(),
        })
}

fn read_extract<R: Read>(reader: R, source: &Path) -> Result<RawExtract> {
    let csv_err = |source_err: csv::Error| PanelError::Csv {
        path: source.to_path_buf(),
        source: source_err,
    };

    let mut reader = Reader::from_reader(reader);
    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut key_idx = [0usize; 4];
    for (slot, key) in key_idx.iter_mut().zip(KEY_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == key)
            .ok_or_else(|| PanelError::MissingColumn {
                column: key.to_string(),
                path: source.to_path_buf(),
            })?;
    }

    // Pandas-style unnamed index columns are dropped
    let attr_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !key_idx.contains(i) && !headers[*i].is_empty())
        .filter(|i| !headers[*i].starts_with("Unnamed"))
        .collect();
    let columns = attr_idx.iter().map(|i| headers[*i].to_string()).collect();

    let mut keys = Vec::new();
    let mut cells = Vec::new();
    let mut bad_weights = 0;
    let mut record = StringRecord::new();
    while reader.read_record(&mut record).map_err(csv_err)? {
        let pidp = parse_id(PIDP, &record[key_idx[0]], source)?;
        let hidp = parse_id(HIDP, &record[key_idx[1]], source)?;
        let raw_time = &record[key_idx[2]];
        let time = i32::try_from(parse_id(TIME, raw_time, source)?).map_err(|_| {
            PanelError::InvalidValue {
                field: TIME.to_string(),
                value: raw_time.to_string(),
                path: source.to_path_buf(),
            }
        })?;
        let weight = match ColumnKind::Float
            .coerce(Value::parse(&record[key_idx[3]]))
            .and_then(|w| w.as_f64())
        {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => {
                bad_weights += 1;
                0.0
            }
        };
        keys.push((pidp, hidp, time, weight));
        cells.push(attr_idx.iter().map(|i| Value::parse(&record[*i])).collect());
    }

    Ok(RawExtract {
        source: source.to_path_buf(),
        columns,
        keys,
        cells,
        bad_weights,
    })
}

/// Merge extracts into one panel, fixing one kind per column
///
/// Columns absent from some waves are filled with the missing marker for
/// those waves, the way wave-specific questionnaire gaps show up upstream.
fn assemble(extracts: Vec<RawExtract>, kinds: &ColumnKinds) -> Result<Panel> {
    let mut names: Vec<String> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for extract in &extracts {
        for column in &extract.columns {
            if !position.contains_key(column) {
                position.insert(column.clone(), names.len());
                names.push(column.clone());
            }
        }
    }

    let mut rows = Vec::new();
    let mut origins = Vec::new();
    let mut paths = Vec::new();
    for extract in extracts {
        let missing_here: Vec<&String> = names
            .iter()
            .filter(|n| !extract.columns.contains(*n))
            .collect();
        if !missing_here.is_empty() {
            log::warn!(
                "{} lacks columns {:?}; substituting missing values",
                extract.source.display(),
                missing_here
            );
        }
        if extract.bad_weights > 0 {
            log::warn!(
                "{}: {} rows with missing or invalid weight set to 0",
                extract.source.display(),
                extract.bad_weights
            );
        }
        let slots: Vec<usize> = extract.columns.iter().map(|c| position[c]).collect();
        for ((pidp, hidp, time, weight), cells) in extract.keys.into_iter().zip(extract.cells) {
            let mut values = vec![Value::Missing(MissingCode::Missing); names.len()];
            for (slot, cell) in slots.iter().zip(cells) {
                values[*slot] = cell;
            }
            rows.push(Observation {
                pidp,
                hidp,
                time,
                weight,
                values,
            });
            origins.push(paths.len());
        }
        paths.push(extract.source);
    }

    let mut specs = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let kind = match kinds.get(name) {
            Some(kind) => *kind,
            None => ColumnKind::infer(rows.iter().map(|r| &r.values[i])),
        };
        for (row, origin) in rows.iter_mut().zip(&origins) {
            let cell = std::mem::replace(&mut row.values[i], Value::Structural);
            let raw = cell.to_string();
            row.values[i] = kind.coerce(cell).ok_or_else(|| PanelError::InvalidValue {
                field: name.clone(),
                value: raw,
                path: paths[*origin].clone(),
            })?;
        }
        specs.push(ColumnSpec {
            name: name.clone(),
            kind,
        });
    }

    Ok(Panel::new(Arc::new(Schema::new(specs)), rows))
}

/// Load a single CSV file as a panel
pub fn load_panel<P: AsRef<Path>>(path: P, kinds: &ColumnKinds) -> Result<Panel> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| PanelError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    assemble(vec![read_extract(file, path)?], kinds)
}

/// Load a panel from any reader (e.g. string buffer)
pub fn load_panel_from_reader<R: Read>(reader: R, kinds: &ColumnKinds) -> Result<Panel> {
    assemble(vec![read_extract(reader, Path::new("<reader>"))?], kinds)
}

/// Load every wave in `[first, last]` from a directory of per-year extracts
pub fn load_waves(dir: &Path, first: i32, last: i32, kinds: &ColumnKinds) -> Result<Panel> {
    let mut extracts = Vec::new();
    for year in first..=last {
        let path = wave_path(dir, year);
        let file = File::open(&path).map_err(|source| PanelError::FileRead {
            path: path.clone(),
            source,
        })?;
        extracts.push(read_extract(file, &path)?);
    }
    let panel = assemble(extracts, kinds)?;
    log::info!(
        "Loaded {} observations of {} individuals from {} waves",
        panel.len(),
        panel.person_count(),
        last - first + 1
    );
    Ok(panel)
}

/// Write a panel as CSV to any writer
pub fn write_panel<W: Write>(panel: &Panel, writer: W) -> Result<()> {
    write_rows(panel, panel.rows().iter(), writer, Path::new("<writer>"))
}

fn write_rows<'a, W, I>(panel: &Panel, rows: I, writer: W, path: &Path) -> Result<()>
where
    W: Write,
    I: Iterator<Item = &'a Observation>,
{
    let csv_err = |source: csv::Error| PanelError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut out = Writer::from_writer(writer);

    let mut header: Vec<&str> = KEY_COLUMNS.to_vec();
    header.extend(panel.schema().columns().iter().map(|c| c.name.as_str()));
    out.write_record(&header).map_err(csv_err)?;

    for row in rows {
        let mut record = vec![
            row.pidp.to_string(),
            row.hidp.to_string(),
            row.time.to_string(),
            row.weight.to_string(),
        ];
        record.extend(row.values.iter().map(|v| v.to_string()));
        out.write_record(&record).map_err(csv_err)?;
    }
    out.flush().map_err(|source| PanelError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a whole panel to one file
pub fn save_panel<P: AsRef<Path>>(panel: &Panel, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path).map_err(|source| PanelError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    write_rows(panel, panel.rows().iter(), file, path)?;
    log::info!("Saved {} rows to {}", panel.len(), path.display());
    Ok(())
}

/// Write one file per year present in the panel
pub fn save_waves(panel: &Panel, dir: &Path) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut written = Vec::new();
    for year in panel.years() {
        let path = wave_path(dir, year);
        let file = File::create(&path).map_err(|source| PanelError::FileWrite {
            path: path.clone(),
            source,
        })?;
        write_rows(panel, panel.wave(year), file, &path)?;
        log::info!("Data for {} saved to {}", year, path.display());
        written.push(path);
    }
    Ok(written)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    log::info!("Output directory not found, creating {}", dir.display());
    fs::create_dir_all(dir).map_err(|source| PanelError::FileWrite {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAVE: &str = "\
,pidp,hidp,time,weight,sex,ethnicity,age,education_state
0,1,10,2010,1.5,Female,WBI,30,-9
1,2,20,2010,-9,Male,-9.0,41,3.0
";

    #[test]
    fn test_load_from_reader() {
        let panel = load_panel_from_reader(WAVE.as_bytes(), &ColumnKinds::new()).unwrap();
        assert_eq!(panel.len(), 2);

        let schema = panel.schema();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.kind(schema.require("sex").unwrap()), ColumnKind::Text);
        assert_eq!(schema.kind(schema.require("age").unwrap()), ColumnKind::Int);

        let eth = schema.require("ethnicity").unwrap();
        let edu = schema.require("education_state").unwrap();
        let second = &panel.rows()[1];
        assert_eq!(second.get(eth), &Value::Missing(MissingCode::Missing));
        assert_eq!(second.get(edu), &Value::Int(3));
        // Sentinel weight is excluded rather than rejected
        assert_eq!(second.weight, 0.0);
    }

    #[test]
    fn test_weights_are_parsed() {
        let csv = "pidp,hidp,time,weight,sex\n1,10,2010,1.5,Female\n2,20,2010,2,Male\n3,30,2010,abc,Male\n";
        let panel = load_panel_from_reader(csv.as_bytes(), &ColumnKinds::new()).unwrap();
        let weights: Vec<f64> = panel.rows().iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![1.5, 2.0, 0.0]);

        let panel = load_panel_from_reader(WAVE.as_bytes(), &ColumnKinds::new()).unwrap();
        assert_eq!(panel.rows()[0].weight, 1.5);
    }

    #[test]
    fn test_out_of_range_year_is_an_error() {
        let csv = "pidp,hidp,time,weight,sex\n1,10,4294969306,1.0,Female\n";
        let err = load_panel_from_reader(csv.as_bytes(), &ColumnKinds::new()).unwrap_err();
        assert!(matches!(err, PanelError::InvalidValue { ref field, .. } if field == "time"));
    }

    #[test]
    fn test_declared_kind_wins() {
        let mut kinds = ColumnKinds::new();
        kinds.insert("age".to_string(), ColumnKind::Float);
        let panel = load_panel_from_reader(WAVE.as_bytes(), &kinds).unwrap();
        let age = panel.schema().require("age").unwrap();
        assert_eq!(panel.rows()[0].get(age), &Value::Float(30.0));
    }

    #[test]
    fn test_missing_key_column() {
        let csv = "pidp,time,weight,sex\n1,2010,1.0,Male\n";
        let err = load_panel_from_reader(csv.as_bytes(), &ColumnKinds::new()).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn { ref column, .. } if column == "hidp"));
    }

    #[test]
    fn test_uncoercible_value_is_an_error() {
        let mut kinds = ColumnKinds::new();
        kinds.insert("sex".to_string(), ColumnKind::Int);
        assert!(load_panel_from_reader(WAVE.as_bytes(), &kinds).is_err());
    }

    #[test]
    fn test_save_and_reload_waves() {
        let dir = tempfile::tempdir().unwrap();
        let base = load_panel_from_reader(WAVE.as_bytes(), &ColumnKinds::new()).unwrap();
        let schema = base.shared_schema();
        let mut rows = base.into_rows();
        let mut later = rows[0].clone();
        later.time = 2011;
        rows.push(later);
        let panel = Panel::new(schema, rows);

        let written = save_waves(&panel, dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(wave_path(dir.path(), 2011).exists());

        let reloaded = load_waves(dir.path(), 2010, 2011, &ColumnKinds::new()).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.schema(), panel.schema());
        assert_eq!(reloaded.rows()[0], panel.rows()[0]);
    }

    #[test]
    fn test_missing_wave_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_waves(dir.path(), 2010, 2010, &ColumnKinds::new()).unwrap_err();
        assert!(matches!(err, PanelError::FileRead { .. }));
    }
}
