use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

use std::{
    collections::BTreeMap,
    fmt::Display,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use crate::cell::Cell;

/// Column holding the category, added to every row by the loader.
pub const CATEGORY_COLUMN: &str = "category";
/// Accepted names for the product name column.
pub const NAME_COLUMNS: [&str; 2] = ["nom", "name"];
/// Accepted names for the quantity column.
pub const QUANTITY_COLUMNS: [&str; 2] = ["quantite", "quantity"];
/// Accepted names for the unit price column.
pub const UNIT_PRICE_COLUMNS: [&str; 2] = ["prix_unitaire", "unit_price"];

static MISSING: Cell = Cell::Missing;

/// One row of inventory data, keyed by normalized column name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    cells: BTreeMap<String, Cell>,
}

impl Record {
    /// Returns the cell in `column`, or [`Cell::Missing`] if the row has no
    /// such column.
    #[must_use]
    pub fn get(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&MISSING)
    }

    /// Sets the cell in `column`, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.insert(column.into(), cell);
    }

    /// Returns the product name, if the row has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.first_of(&NAME_COLUMNS).and_then(Cell::as_text)
    }

    #[must_use]
    pub fn quantity(&self) -> Option<f64> {
        self.first_of(&QUANTITY_COLUMNS).and_then(Cell::as_number)
    }

    #[must_use]
    pub fn unit_price(&self) -> Option<f64> {
        self.first_of(&UNIT_PRICE_COLUMNS).and_then(Cell::as_number)
    }

    /// Returns the category this row was loaded under.
    #[must_use]
    pub fn category(&self) -> &str {
        self.get(CATEGORY_COLUMN).as_text().unwrap_or_default()
    }

    fn first_of(&self, aliases: &[&str]) -> Option<&Cell> {
        aliases.iter().find_map(|column| self.cells.get(*column))
    }

    fn coerce_numeric(&mut self) {
        for column in QUANTITY_COLUMNS.iter().chain(UNIT_PRICE_COLUMNS.iter()) {
            if let Some(cell) = self.cells.get_mut(*column) {
                *cell = std::mem::take(cell).into_numeric();
            }
        }
    }
}

/// A table of inventory records, consolidated from one or more CSV files.
///
/// To load every CSV file in a directory, use [`Inventory::from_dir`] (or
/// [`Inventory::consolidate`] to also find out which files were skipped).
///
/// To filter the records, use [`Inventory::search`].
///
/// To get a printable version of the table, use its [`Display`] implementation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    columns: Vec<String>,
    records: Vec<Record>,
}

/// The result of consolidating a directory: the merged inventory, plus the
/// files that couldn't be read.
#[derive(Debug, Default)]
pub struct Consolidation {
    pub inventory: Inventory,
    pub skipped: Vec<SkippedFile>,
}

/// A CSV file left out of a consolidation, and why.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl Inventory {
    /// Creates a new, empty inventory with no columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and merges every `.csv` file in `dir`.
    ///
    /// Unreadable files are logged and skipped. See [`Inventory::consolidate`].
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` doesn't exist, isn't a directory, or can't be
    /// listed.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::consolidate(dir)?.inventory)
    }

    /// Reads and merges every `.csv` file in `dir`.
    ///
    /// Files are taken in directory listing order, and rows keep their order
    /// within each file. Only names ending in `.csv` (case-sensitive) are
    /// read. Every row gets a `category` cell holding its file name without
    /// the `.csv` suffix.
    ///
    /// A file that can't be parsed, or whose name isn't valid UTF-8, is
    /// logged, recorded in [`Consolidation::skipped`], and contributes no
    /// rows. The quantity and unit price columns are coerced to numbers;
    /// values that aren't numbers become missing.
    ///
    /// If no file could be read, the inventory is empty and has no columns.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` doesn't exist, isn't a directory, or can't be
    /// listed.
    pub fn consolidate(dir: impl AsRef<Path>) -> Result<Consolidation> {
        let dir = dir.as_ref();
        if !dir.exists() {
            bail!("directory not found: {}", dir.display());
        }
        if !dir.is_dir() {
            bail!("not a directory: {}", dir.display());
        }
        let entries =
            fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
        let mut consolidation = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|path| is_csv(path))
            .fold(Consolidation::default(), |mut acc, path| {
                let table = match category_of(&path) {
                    Some(category) => Self::read_csv(&path, category),
                    None => Err(anyhow!("file name is not valid UTF-8")),
                };
                match table {
                    Ok(table) => {
                        debug!(path = %path.display(), rows = table.len(), "loaded file");
                        acc.inventory.append(table);
                    }
                    Err(e) => {
                        let reason = format!("{e:#}");
                        warn!(path = %path.display(), %reason, "skipping file");
                        acc.skipped.push(SkippedFile { path, reason });
                    }
                }
                acc
            });
        consolidation.inventory.coerce_numeric();
        info!(
            dir = %dir.display(),
            rows = consolidation.inventory.len(),
            skipped = consolidation.skipped.len(),
            "consolidated inventory"
        );
        Ok(consolidation)
    }

    /// Reads a single CSV file at `path`, tagging every row with `category`.
    ///
    /// Column names are lowercased and trimmed. Values are kept as text; see
    /// [`Inventory::consolidate`] for numeric coercion.
    ///
    /// # Errors
    ///
    /// Returns any errors from opening or parsing the file, or an error if the
    /// file has no header row.
    pub fn read_csv(path: impl AsRef<Path>, category: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::read_csv_from(file, category).with_context(|| format!("{}", path.display()))
    }

    /// Reads CSV data from `reader`, tagging every row with `category`.
    ///
    /// Rows shorter than the header are kept, with the trailing cells
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns any errors from parsing the data, or an error if there's no
    /// header row or a row has more fields than the header.
    pub fn read_csv_from(reader: impl Read, category: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();
        if headers.is_empty() {
            bail!("no header row");
        }
        let mut columns: Vec<String> = Vec::with_capacity(headers.len() + 1);
        for column in headers.iter().map(String::as_str).chain([CATEGORY_COLUMN]) {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result?;
            if row.len() > headers.len() {
                let line = row.position().map_or(0, csv::Position::line);
                bail!(
                    "line {line}: expected {} fields, found {}",
                    headers.len(),
                    row.len()
                );
            }
            let mut record = Record::default();
            for (column, field) in headers.iter().zip(row.iter()) {
                record.set(column.as_str(), Cell::from_field(field));
            }
            record.set(CATEGORY_COLUMN, Cell::Text(category.to_string()));
            records.push(record);
        }
        Ok(Self { columns, records })
    }

    /// Appends the rows of `other`, adding any columns not seen before.
    pub fn append(&mut self, other: Inventory) {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.records.extend(other.records);
    }

    /// Coerces the quantity and unit price columns of every row to numbers.
    pub fn coerce_numeric(&mut self) {
        self.records.iter_mut().for_each(Record::coerce_numeric);
    }

    /// Writes the table to `path` as CSV, with a header row.
    ///
    /// Missing values are written as empty fields.
    ///
    /// # Errors
    ///
    /// Returns any errors from creating or writing the file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut wtr =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        if !self.columns.is_empty() {
            wtr.write_record(&self.columns)?;
        }
        for record in &self.records {
            wtr.write_record(self.columns.iter().map(|c| record.get(c).to_string()))?;
        }
        wtr.flush()
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            columns: self.columns.clone(),
            records,
        }
    }
}

impl Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.columns.is_empty() {
            return writeln!(f, "(no data)");
        }
        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|column| {
                self.records
                    .iter()
                    .map(|r| r.get(column).to_string().chars().count())
                    .chain(std::iter::once(column.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect();
        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, &width)| format!("{column:width$}"))
            .collect();
        writeln!(f, "{}", header.join(" ").trim_end())?;
        let length = widths.iter().sum::<usize>() + widths.len() - 1;
        writeln!(f, "{:-<length$}", "")?;
        for record in &self.records {
            let line: Vec<String> = self
                .columns
                .iter()
                .zip(&widths)
                .map(|(column, &width)| match record.get(column) {
                    cell @ Cell::Number(_) => format!("{cell:>width$}"),
                    cell => format!("{cell:width$}"),
                })
                .collect();
            writeln!(f, "{}", line.join(" ").trim_end())?;
        }
        Ok(())
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn is_csv(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.as_encoded_bytes().ends_with(b".csv"))
}

fn category_of(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()?.strip_suffix(".csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn read_csv_fn_tags_rows_with_category() {
        let table = Inventory::read_csv("testdata/inventory/fruits.csv", "fruits").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.records().iter().all(|r| r.category() == "fruits"));
        assert_eq!(table.records()[0].name(), Some("banane"));
    }

    #[test]
    fn read_csv_from_fn_normalizes_column_names() {
        let data = " Nom ,QUANTITE,Prix_Unitaire\npc,2,500.99\n";
        let table = Inventory::read_csv_from(data.as_bytes(), "it").unwrap();
        assert_eq!(
            table.columns(),
            ["nom", "quantite", "prix_unitaire", "category"]
        );
        assert_eq!(table.records()[0].name(), Some("pc"));
    }

    #[test]
    fn read_csv_from_fn_returns_error_for_ragged_rows() {
        let data = "nom,quantite,prix_unitaire\npc,2,500.99,extra\n";
        assert!(Inventory::read_csv_from(data.as_bytes(), "it").is_err());
    }

    #[test]
    fn read_csv_from_fn_keeps_short_rows_with_missing_cells() {
        let data = "nom,quantite,prix_unitaire\npc,2\necran,1,100.99\nclavier,3,20\n";
        let mut table = Inventory::read_csv_from(data.as_bytes(), "it").unwrap();
        table.coerce_numeric();
        assert_eq!(table.len(), 3);
        let pc = &table.records()[0];
        assert_eq!(pc.name(), Some("pc"));
        assert_eq!(pc.quantity(), Some(2.0));
        assert_eq!(pc.unit_price(), None);
        assert_eq!(table.records()[2].unit_price(), Some(20.0));
    }

    #[test]
    fn read_csv_from_fn_returns_error_for_empty_input() {
        assert!(Inventory::read_csv_from("".as_bytes(), "empty").is_err());
    }

    #[test]
    fn read_csv_from_fn_accepts_header_only_file() {
        let table = Inventory::read_csv_from("nom,quantite\n".as_bytes(), "none").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["nom", "quantite", "category"]);
    }

    #[test]
    fn consolidate_fn_merges_all_files_and_keeps_categories() {
        let consolidation = Inventory::consolidate("testdata/inventory").unwrap();
        let inventory = consolidation.inventory;
        // fruits (2) + legumes (2) + vide (0); notes.txt and SHOUTING.CSV are ignored
        assert_eq!(inventory.len(), 4);
        let categories: HashSet<&str> = inventory.records().iter().map(Record::category).collect();
        assert_eq!(categories, HashSet::from(["fruits", "legumes"]));
        for record in inventory.records() {
            let expected = match record.name() {
                Some("banane" | "pomme") => "fruits",
                Some("carotte" | "courgette") => "legumes",
                other => panic!("unexpected row {other:?}"),
            };
            assert_eq!(record.category(), expected);
        }
        assert!(consolidation.skipped.is_empty());
    }

    #[test]
    fn consolidate_fn_row_count_is_sum_of_file_row_counts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", "nom,quantite,prix_unitaire\nx,1,1\ny,2,2\nz,3,3\n");
        write(dir.path(), "b.csv", "nom,quantite,prix_unitaire\nw,4,4\n");
        let inventory = Inventory::from_dir(dir.path()).unwrap();
        assert_eq!(inventory.len(), 4);
        let a: Vec<_> = inventory
            .records()
            .iter()
            .filter(|r| r.category() == "a")
            .filter_map(Record::name)
            .collect();
        assert_eq!(a, ["x", "y", "z"], "rows keep their order within a file");
    }

    #[test]
    fn consolidate_fn_ignores_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "valid.csv", "nom,quantite,prix_unitaire\npc,2,500.99\necran,1,100.99\n");
        write(dir.path(), "empty.csv", "");
        let consolidation = Inventory::consolidate(dir.path()).unwrap();
        assert_eq!(consolidation.inventory.len(), 2);
        assert!(consolidation
            .inventory
            .records()
            .iter()
            .all(|r| r.category() == "valid"));
        assert_eq!(consolidation.skipped.len(), 1);
        assert!(consolidation.skipped[0].path.ends_with("empty.csv"));
    }

    #[test]
    fn consolidate_fn_skips_malformed_file_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.csv", "nom,quantite,prix_unitaire\npc,2,500.99\n");
        write(dir.path(), "bad.csv", "nom,quantite\npc,2,3,4\n");
        let consolidation = Inventory::consolidate(dir.path()).unwrap();
        assert_eq!(consolidation.inventory.len(), 1);
        assert_eq!(consolidation.skipped.len(), 1);
    }

    #[test]
    fn consolidate_fn_keeps_files_with_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "it.csv",
            "nom,quantite,prix_unitaire\npc,2\necran,1,100.99\nclavier,3,20\n",
        );
        let consolidation = Inventory::consolidate(dir.path()).unwrap();
        assert!(consolidation.skipped.is_empty());
        assert_eq!(consolidation.inventory.len(), 3);
        assert_eq!(consolidation.inventory.records()[0].unit_price(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn consolidate_fn_records_non_utf8_file_name_as_skipped() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.csv", "nom,quantite,prix_unitaire\npc,2,500.99\n");
        let bad_name = OsStr::from_bytes(b"caf\xe9.csv");
        fs::write(dir.path().join(bad_name), "nom\nx\n").unwrap();
        let consolidation = Inventory::consolidate(dir.path()).unwrap();
        assert_eq!(consolidation.inventory.len(), 1);
        assert_eq!(consolidation.skipped.len(), 1);
        assert_eq!(consolidation.skipped[0].path.file_name(), Some(bad_name));
        assert!(consolidation.skipped[0].reason.contains("UTF-8"));
    }

    #[test]
    fn consolidate_fn_returns_empty_table_when_no_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "readme.txt", "nothing here");
        let inventory = Inventory::from_dir(dir.path()).unwrap();
        assert!(inventory.is_empty());
        assert!(inventory.columns().is_empty());
    }

    #[test]
    fn consolidate_fn_returns_error_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = Inventory::consolidate(&missing).unwrap_err();
        assert!(err.to_string().contains("directory not found"));
    }

    #[test]
    fn consolidate_fn_coerces_bad_numbers_to_missing() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "stock.csv",
            "nom,quantite,prix_unitaire\npc,deux,500.99\necran,1,\n",
        );
        let inventory = Inventory::from_dir(dir.path()).unwrap();
        let records = inventory.records();
        assert_eq!(records[0].quantity(), None);
        assert_eq!(records[0].unit_price(), Some(500.99));
        assert_eq!(records[1].quantity(), Some(1.0));
        assert_eq!(records[1].unit_price(), None);
    }

    #[test]
    fn consolidate_fn_keeps_union_of_columns() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stock.csv", "name,quantity,unit_price,supplier\npc,2,500.99,acme\n");
        let inventory = Inventory::from_dir(dir.path()).unwrap();
        assert_eq!(
            inventory.columns(),
            ["name", "quantity", "unit_price", "supplier", "category"]
        );
        let record = &inventory.records()[0];
        assert_eq!(record.name(), Some("pc"));
        assert_eq!(record.quantity(), Some(2.0));
        assert_eq!(record.get("supplier"), &Cell::Text("acme".into()));
    }

    #[test]
    fn write_csv_fn_writes_header_and_empty_missing_values() {
        let mut inventory =
            Inventory::read_csv_from("nom,quantite\npc,\n".as_bytes(), "it").unwrap();
        inventory.coerce_numeric();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        inventory.write_csv(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "nom,quantite,category\npc,,it\n"
        );
    }

    #[test]
    fn display_aligns_columns() {
        let mut inventory = Inventory::read_csv_from(
            "nom,quantite\npc,2\necran,10\n".as_bytes(),
            "it",
        )
        .unwrap();
        inventory.coerce_numeric();
        assert_eq!(
            inventory.to_string(),
            "nom   quantite category\n\
             -----------------------\n\
             pc           2 it\n\
             ecran       10 it\n"
        );
    }
}
