use anyhow::{bail, Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use tracing::{error, info, warn};

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    cell::Cell,
    inventory::{Inventory, Record},
};

/// Name of the workbook sheet holding the [`GlobalSummary`].
pub const GLOBAL_SHEET: &str = "Global Report";
/// Name of the workbook sheet holding the [`CategorySummary`] rows.
pub const CATEGORY_SHEET: &str = "By Category";

const CATEGORY_HEADERS: [&str; 6] = [
    "Category",
    "Products",
    "Total quantity",
    "Mean price",
    "Min price",
    "Max price",
];

/// Summary statistics for an [`Inventory`]: one set of totals for the whole
/// table, and one row per category.
///
/// To compute a report, use [`Report::from_inventory`].
///
/// To save it, use [`Report::write`], or [`generate_report`] to compute and
/// save in one go, logging rather than returning any error.
#[derive(Debug, Default, PartialEq)]
pub struct Report {
    pub global: GlobalSummary,
    pub categories: Vec<CategorySummary>,
}

/// Totals over every row of an inventory.
#[derive(Debug, Default, PartialEq)]
pub struct GlobalSummary {
    pub total_products: usize,
    pub categories: usize,
    /// Sum of quantity × unit price, over rows that have both.
    pub total_stock_value: f64,
    /// Name of the first row with the highest unit price.
    pub most_expensive: Option<String>,
    /// Name of the first row with the lowest unit price.
    pub cheapest: Option<String>,
}

/// Totals for a single category.
///
/// Prices are `None` when no row in the category has a unit price.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct CategorySummary {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Products")]
    pub products: usize,
    #[serde(rename = "Total quantity")]
    pub total_quantity: f64,
    #[serde(rename = "Mean price")]
    pub mean_price: Option<f64>,
    #[serde(rename = "Min price")]
    pub min_price: Option<f64>,
    #[serde(rename = "Max price")]
    pub max_price: Option<f64>,
}

/// The rows of the global report, in the order they're written.
#[derive(Clone, Copy, Debug, DeserializeFromStr, Eq, PartialEq, SerializeDisplay)]
pub enum Metric {
    TotalProducts,
    Categories,
    TotalStockValue,
    MostExpensive,
    Cheapest,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::TotalProducts,
        Metric::Categories,
        Metric::TotalStockValue,
        Metric::MostExpensive,
        Metric::Cheapest,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Metric::TotalProducts => "Total products",
            Metric::Categories => "Categories",
            Metric::TotalStockValue => "Total stock value",
            Metric::MostExpensive => "Most expensive product",
            Metric::Cheapest => "Cheapest product",
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let Some(metric) = Self::ALL.into_iter().find(|m| m.label() == s.trim()) else {
            bail!("unknown metric {s:?}");
        };
        Ok(metric)
    }
}

/// One line of the global report CSV.
#[derive(Debug, Deserialize, Serialize)]
struct GlobalRow {
    #[serde(rename = "Metric")]
    metric: Metric,
    #[serde(rename = "Value")]
    value: String,
}

impl GlobalSummary {
    /// Computes the global totals for `inventory`.
    ///
    /// An empty inventory gives zero totals and no product names.
    #[must_use]
    pub fn from_inventory(inventory: &Inventory) -> Self {
        let records = inventory.records();
        Self {
            total_products: records.len(),
            categories: records
                .iter()
                .map(Record::category)
                .collect::<BTreeSet<_>>()
                .len(),
            total_stock_value: records
                .iter()
                .filter_map(|r| Some(r.quantity()? * r.unit_price()?))
                .fold(0.0, |total, value| total + value),
            most_expensive: first_by_price(records, |price, best| price > best)
                .and_then(Record::name)
                .map(str::to_string),
            cheapest: first_by_price(records, |price, best| price < best)
                .and_then(Record::name)
                .map(str::to_string),
        }
    }

    /// Returns each metric with its value, in report order.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn rows(&self) -> Vec<(Metric, Cell)> {
        let name = |n: &Option<String>| n.clone().map_or(Cell::Missing, Cell::Text);
        Metric::ALL
            .into_iter()
            .map(|metric| {
                let value = match metric {
                    Metric::TotalProducts => Cell::Number(self.total_products as f64),
                    Metric::Categories => Cell::Number(self.categories as f64),
                    Metric::TotalStockValue => Cell::Number(self.total_stock_value),
                    Metric::MostExpensive => name(&self.most_expensive),
                    Metric::Cheapest => name(&self.cheapest),
                };
                (metric, value)
            })
            .collect()
    }

    fn from_rows(rows: impl IntoIterator<Item = GlobalRow>) -> Result<Self> {
        let mut summary = Self::default();
        let mut seen = Vec::new();
        for GlobalRow { metric, value } in rows {
            let context = || format!("parsing {metric} value {value:?}");
            match metric {
                Metric::TotalProducts => {
                    summary.total_products = value.parse().with_context(context)?;
                }
                Metric::Categories => summary.categories = value.parse().with_context(context)?,
                Metric::TotalStockValue => {
                    summary.total_stock_value = value.parse().with_context(context)?;
                }
                Metric::MostExpensive => summary.most_expensive = non_empty(value),
                Metric::Cheapest => summary.cheapest = non_empty(value),
            }
            seen.push(metric);
        }
        if let Some(missing) = Metric::ALL.iter().find(|m| !seen.contains(*m)) {
            bail!("global report has no {missing:?} row", missing = missing.label());
        }
        Ok(summary)
    }
}

#[derive(Default)]
struct CategoryTotals {
    products: usize,
    total_quantity: f64,
    price_sum: f64,
    price_count: usize,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

impl CategorySummary {
    /// Computes one summary per category in `inventory`, sorted by category
    /// name.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_inventory(inventory: &Inventory) -> Vec<Self> {
        let mut totals: BTreeMap<&str, CategoryTotals> = BTreeMap::new();
        for record in inventory.records() {
            let cat = totals.entry(record.category()).or_default();
            cat.products += 1;
            cat.total_quantity += record.quantity().unwrap_or_default();
            if let Some(price) = record.unit_price() {
                cat.price_sum += price;
                cat.price_count += 1;
                cat.min_price = Some(cat.min_price.map_or(price, |min| min.min(price)));
                cat.max_price = Some(cat.max_price.map_or(price, |max| max.max(price)));
            }
        }
        totals
            .into_iter()
            .map(|(category, cat)| Self {
                category: category.to_string(),
                products: cat.products,
                total_quantity: cat.total_quantity,
                mean_price: (cat.price_count > 0).then(|| cat.price_sum / cat.price_count as f64),
                min_price: cat.min_price,
                max_price: cat.max_price,
            })
            .collect()
    }

    fn cells(&self) -> [Cell; 6] {
        let price = |p: Option<f64>| p.map_or(Cell::Missing, Cell::Number);
        #[allow(clippy::cast_precision_loss)]
        let products = Cell::Number(self.products as f64);
        [
            Cell::Text(self.category.clone()),
            products,
            Cell::Number(self.total_quantity),
            price(self.mean_price),
            price(self.min_price),
            price(self.max_price),
        ]
    }
}

impl Report {
    /// Computes the global and per-category summaries for `inventory`.
    #[must_use]
    pub fn from_inventory(inventory: &Inventory) -> Self {
        Self {
            global: GlobalSummary::from_inventory(inventory),
            categories: CategorySummary::from_inventory(inventory),
        }
    }

    /// Saves the report to `output`.
    ///
    /// If `output` ends in `.xlsx`, writes a workbook (see
    /// [`Report::write_xlsx`]). Otherwise `output` is used as a stem for a
    /// pair of CSV files (see [`Report::write_csv_pair`]); each file is
    /// checked for afterwards, and a warning logged if it's not there.
    ///
    /// # Errors
    ///
    /// Returns any errors from creating or writing the output files.
    pub fn write(&self, output: impl AsRef<Path>) -> Result<()> {
        let output = output.as_ref();
        if output.to_string_lossy().ends_with(".xlsx") {
            return self.write_xlsx(output);
        }
        let written = self.write_csv_pair(output)?;
        for path in missing_files(&[written.0, written.1]) {
            warn!(path = %path.display(), "report file missing after write");
        }
        Ok(())
    }

    /// Writes the report to a workbook at `path`, with a [`GLOBAL_SHEET`]
    /// sheet (the active one) and a [`CATEGORY_SHEET`] sheet.
    ///
    /// # Errors
    ///
    /// Returns any errors from building or saving the workbook.
    pub fn write_xlsx(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bold = Format::new().set_bold();
        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet().set_name(GLOBAL_SHEET)?;
        sheet.write_string_with_format(0, 0, "Metric", &bold)?;
        sheet.write_string_with_format(0, 1, "Value", &bold)?;
        for (index, (metric, value)) in self.global.rows().into_iter().enumerate() {
            let row = u32::try_from(index + 1)?;
            sheet.write_string(row, 0, metric.label())?;
            write_cell(sheet, row, 1, &value)?;
        }
        sheet.autofit();
        sheet.set_active(true);

        let sheet = workbook.add_worksheet().set_name(CATEGORY_SHEET)?;
        for (col, header) in (0u16..).zip(CATEGORY_HEADERS) {
            sheet.write_string_with_format(0, col, header, &bold)?;
        }
        for (index, summary) in self.categories.iter().enumerate() {
            let row = u32::try_from(index + 1)?;
            for (col, value) in (0u16..).zip(summary.cells()) {
                write_cell(sheet, row, col, &value)?;
            }
        }
        sheet.autofit();

        workbook
            .save(path)
            .with_context(|| format!("saving {}", path.display()))?;
        Ok(())
    }

    /// Writes the report as two CSV files, `<stem>_global.csv` and
    /// `<stem>_categories.csv`, returning their paths.
    ///
    /// # Errors
    ///
    /// Returns any errors from creating or writing either file.
    pub fn write_csv_pair(&self, stem: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let (global_path, categories_path) = csv_pair_paths(stem.as_ref());

        let mut wtr = csv::Writer::from_path(&global_path)
            .with_context(|| format!("creating {}", global_path.display()))?;
        for (metric, value) in self.global.rows() {
            wtr.serialize(GlobalRow {
                metric,
                value: value.to_string(),
            })?;
        }
        wtr.flush()
            .with_context(|| format!("writing {}", global_path.display()))?;

        let mut wtr = csv::Writer::from_path(&categories_path)
            .with_context(|| format!("creating {}", categories_path.display()))?;
        if self.categories.is_empty() {
            wtr.write_record(CATEGORY_HEADERS)?;
        }
        for summary in &self.categories {
            wtr.serialize(summary)?;
        }
        wtr.flush()
            .with_context(|| format!("writing {}", categories_path.display()))?;

        Ok((global_path, categories_path))
    }

    /// Reads back a report written by [`Report::write_csv_pair`] with the same
    /// `stem`.
    ///
    /// # Errors
    ///
    /// Returns any errors from opening or parsing either file, or an error if
    /// the global report is missing a metric.
    pub fn read_csv_pair(stem: impl AsRef<Path>) -> Result<Self> {
        let (global_path, categories_path) = csv_pair_paths(stem.as_ref());

        let mut rdr = csv::Reader::from_path(&global_path)
            .with_context(|| format!("opening {}", global_path.display()))?;
        let rows = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<GlobalRow>, _>>()
            .with_context(|| format!("{}", global_path.display()))?;
        let global = GlobalSummary::from_rows(rows)
            .with_context(|| format!("{}", global_path.display()))?;

        let mut rdr = csv::Reader::from_path(&categories_path)
            .with_context(|| format!("opening {}", categories_path.display()))?;
        let categories = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<CategorySummary>, _>>()
            .with_context(|| format!("{}", categories_path.display()))?;

        Ok(Self { global, categories })
    }
}

/// Computes the report for `inventory` and saves it to `output`.
///
/// Any error is logged rather than returned: a failed report never stops the
/// caller. Returns whether the report was written.
pub fn generate_report(inventory: &Inventory, output: impl AsRef<Path>) -> bool {
    let output = output.as_ref();
    match Report::from_inventory(inventory).write(output) {
        Ok(()) => {
            info!(path = %output.display(), rows = inventory.len(), "report generated");
            true
        }
        Err(e) => {
            let reason = format!("{e:#}");
            error!(path = %output.display(), %reason, "report generation failed");
            false
        }
    }
}

/// Returns the global and category CSV paths for a report `stem`.
#[must_use]
pub fn csv_pair_paths(stem: &Path) -> (PathBuf, PathBuf) {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(stem.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };
    (with_suffix("_global.csv"), with_suffix("_categories.csv"))
}

/// Returns those `paths` that don't exist on disk.
fn missing_files(paths: &[PathBuf]) -> Vec<&Path> {
    paths
        .iter()
        .map(PathBuf::as_path)
        .filter(|path| !path.exists())
        .collect()
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<()> {
    match cell {
        Cell::Missing => {}
        Cell::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        Cell::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
    }
    Ok(())
}

/// Picks the first record whose price beats every earlier one, per `beats`.
fn first_by_price(records: &[Record], beats: impl Fn(f64, f64) -> bool) -> Option<&Record> {
    records
        .iter()
        .filter_map(|r| Some((r, r.unit_price()?)))
        .fold(None::<(&Record, f64)>, |best, (record, price)| match best {
            Some((_, best_price)) if !beats(price, best_price) => best,
            _ => Some((record, price)),
        })
        .map(|(record, _)| record)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
